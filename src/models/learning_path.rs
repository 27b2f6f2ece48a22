use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPath {
    pub path_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

impl LearningPath {
    fn seed(path_id: &str, title: &str, description: &str, category: &str, tags: &[&str]) -> Self {
        Self {
            path_id: path_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Paths loaded into an empty catalogue at startup.
    pub fn starter_catalog() -> Vec<Self> {
        vec![
            Self::seed(
                "rust-fundamentals",
                "Rust Fundamentals",
                "Ownership, borrowing and lifetimes in bite-sized lessons.",
                "Programming",
                &["rust", "systems"],
            ),
            Self::seed(
                "web-design-basics",
                "Web Design Basics",
                "Layout, colour and typography for the modern web.",
                "Design",
                &["css", "ui"],
            ),
            Self::seed(
                "personal-finance",
                "Personal Finance 101",
                "Budgeting, saving and investing explained in minutes a day.",
                "Finance",
                &["money", "budgeting"],
            ),
            Self::seed(
                "data-science-intro",
                "Intro to Data Science",
                "From spreadsheets to statistics and simple models.",
                "Data",
                &["python", "statistics"],
            ),
            Self::seed(
                "public-speaking",
                "Public Speaking",
                "Short drills to speak with confidence.",
                "Communication",
                &["presentation", "confidence"],
            ),
            Self::seed(
                "spanish-everyday",
                "Everyday Spanish",
                "Phrases for travel, food and small talk.",
                "Languages",
                &["spanish", "travel"],
            ),
        ]
    }

    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.category.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_matching() {
        let catalog = LearningPath::starter_catalog();
        let rust: Vec<_> = catalog.iter().filter(|p| p.matches("RUST")).collect();
        assert_eq!(rust.len(), 1);
        assert!(catalog.iter().any(|p| p.matches("travel")));
        assert!(!catalog.iter().any(|p| p.matches("quantum")));
    }
}
