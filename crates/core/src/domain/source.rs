use serde::{Deserialize, Serialize};

/// A remote data integration the intel API can run lookups against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub acronym: String,
}

impl Source {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        acronym: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), name: name.into(), acronym: acronym.into() }
    }

    /// Short attribution used in fallback text and error fragments.
    pub fn label(&self) -> &str {
        [&self.name, &self.acronym]
            .into_iter()
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(&self.id)
    }

    /// `Name (ACR)`, or `None` when the source carries neither.
    pub fn heading(&self) -> Option<String> {
        if self.name.is_empty() && self.acronym.is_empty() {
            return None;
        }

        if self.acronym.is_empty() {
            Some(self.name.clone())
        } else {
            Some(format!("{} ({})", self.name, self.acronym))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Source;

    #[test]
    fn label_falls_back_from_name_to_acronym_to_id() {
        assert_eq!(Source::new("vt", "VirusTotal", "VT").label(), "VirusTotal");
        assert_eq!(Source::new("vt", "", "VT").label(), "VT");
        assert_eq!(Source::new("vt", "", "").label(), "vt");
    }

    #[test]
    fn heading_includes_acronym_when_present() {
        assert_eq!(
            Source::new("vt", "VirusTotal", "VT").heading().as_deref(),
            Some("VirusTotal (VT)")
        );
        assert_eq!(Source::new("x", "Shodan", "").heading().as_deref(), Some("Shodan"));
        assert_eq!(Source::new("x", "", "").heading(), None);
    }
}
