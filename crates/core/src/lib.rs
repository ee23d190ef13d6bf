pub mod config;
pub mod domain;
pub mod errors;
pub mod grouping;
pub mod intel;
pub mod normalize;
pub mod payloads;
pub mod reduce;
pub mod registry;

pub use domain::entity::{Entity, EntityKey, EntityType};
pub use domain::lookup::{LookupResponse, LookupResult};
pub use domain::source::Source;
pub use errors::IntelError;
pub use grouping::{EntityGroup, EntityGrouper, SourceContribution};
pub use intel::IntelClient;
pub use normalize::{normalize_result, normalize_results, AttributedResult, ResultView};
pub use payloads::{PayloadHandle, PayloadStore};
pub use reduce::reduce_value;
pub use registry::{SourceRegistry, SourceSnapshot};
