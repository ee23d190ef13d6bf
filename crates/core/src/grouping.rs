//! Entity grouper.
//!
//! Sources report back in whatever order the network delivers them. The
//! grouper accumulates their normalized results into one group per entity
//! identity and only imposes an order when the caller finishes it, after
//! every source has settled.
//!
//! Ordering is deterministic: groups follow the order the entities were
//! parsed from the query (entities the parse did not return come after, in
//! first-seen order), and members inside a group follow the registry order of
//! their sources.

use std::collections::HashMap;

use crate::{
    domain::{
        entity::{Entity, EntityKey},
        source::Source,
    },
    normalize::AttributedResult,
};

#[derive(Clone, Debug, PartialEq)]
pub struct EntityGroup {
    pub key: EntityKey,
    pub entity: Entity,
    pub results: Vec<AttributedResult>,
}

impl EntityGroup {
    pub fn has_data(&self) -> bool {
        self.results.iter().any(AttributedResult::has_data)
    }

    pub fn results_with_data(&self) -> impl Iterator<Item = &AttributedResult> {
        self.results.iter().filter(|result| result.has_data())
    }
}

/// Everything one source reported for a query.
#[derive(Clone, Debug)]
pub struct SourceContribution {
    pub source: Source,
    /// Position of the source in the registry snapshot the query runs against.
    pub source_rank: usize,
    pub searched_entities: Vec<Entity>,
    pub results: Vec<AttributedResult>,
}

#[derive(Debug)]
struct PendingGroup {
    key: EntityKey,
    entity: Entity,
    first_seen: usize,
    members: Vec<Member>,
}

#[derive(Debug)]
struct Member {
    source_rank: usize,
    arrival: usize,
    result: AttributedResult,
}

#[derive(Debug, Default)]
pub struct EntityGrouper {
    entity_rank: HashMap<EntityKey, usize>,
    index: HashMap<EntityKey, usize>,
    groups: Vec<PendingGroup>,
    arrivals: usize,
}

impl EntityGrouper {
    pub fn new(parsed_entities: &[Entity]) -> Self {
        let mut entity_rank = HashMap::new();
        for (rank, entity) in parsed_entities.iter().enumerate() {
            entity_rank.entry(entity.key()).or_insert(rank);
        }

        Self { entity_rank, ..Self::default() }
    }

    pub fn add(&mut self, contribution: SourceContribution) {
        let SourceContribution { source, source_rank, searched_entities, results } = contribution;

        let placeholders: Vec<AttributedResult> = searched_entities
            .into_iter()
            .filter(|searched| !results.iter().any(|result| result.entity.value == searched.value))
            .map(|searched| AttributedResult::placeholder(searched, source.clone()))
            .collect();

        for result in results.into_iter().chain(placeholders) {
            self.push(source_rank, result);
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Orders the groups and drops every group no source found anything for.
    pub fn finish(self) -> Vec<EntityGroup> {
        let Self { entity_rank, mut groups, .. } = self;

        groups.sort_by_key(|group| {
            (entity_rank.get(&group.key).copied().unwrap_or(usize::MAX), group.first_seen)
        });

        groups
            .into_iter()
            .map(|mut group| {
                group.members.sort_by_key(|member| (member.source_rank, member.arrival));
                EntityGroup {
                    key: group.key,
                    entity: group.entity,
                    results: group.members.into_iter().map(|member| member.result).collect(),
                }
            })
            .filter(EntityGroup::has_data)
            .collect()
    }

    fn push(&mut self, source_rank: usize, result: AttributedResult) {
        let arrival = self.arrivals;
        self.arrivals += 1;

        let key = result.entity.key();
        let position = match self.index.get(&key) {
            Some(position) => *position,
            None => {
                let position = self.groups.len();
                self.groups.push(PendingGroup {
                    key: key.clone(),
                    entity: result.entity.clone(),
                    first_seen: arrival,
                    members: Vec::new(),
                });
                self.index.insert(key, position);
                position
            }
        };

        self.groups[position].members.push(Member { source_rank, arrival, result });
    }
}

/// Groups the results of a single source, e.g. for streaming one message per source.
pub fn group_source_results(
    parsed_entities: &[Entity],
    source: &Source,
    results: Vec<AttributedResult>,
) -> Vec<EntityGroup> {
    let mut grouper = EntityGrouper::new(parsed_entities);
    grouper.add(SourceContribution {
        source: source.clone(),
        source_rank: 0,
        searched_entities: Vec::new(),
        results,
    });
    grouper.finish()
}
