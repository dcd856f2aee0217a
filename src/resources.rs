//! Curated reading list shown in the resource hub.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Resource {
    pub title: &'static str,
    pub source: &'static str,
    pub url: &'static str,
    pub tag: &'static str,
}

const RESOURCES: &[Resource] = &[
    Resource {
        title: "Ten Essential Steps to Achieve Gender Equality in Academia",
        source: "Nature",
        url: "https://www.nature.com/articles/s44185-025-00105-6",
        tag: "Research",
    },
    Resource {
        title: "Women in STEM: The Importance of Mentorship and Community",
        source: "ASM.org",
        url: "https://asm.org/articles/2024/october/women-stem-importance-mentorship-community",
        tag: "Mentorship",
    },
    Resource {
        title: "Through the Glass Ceiling: The Quest for Gender Equality",
        source: "PMC",
        url: "https://pmc.ncbi.nlm.nih.gov/articles/PMC11332561/",
        tag: "Career",
    },
    Resource {
        title: "Gender Bias in Academia: A Lifetime Problem That Needs Solutions",
        source: "PMC",
        url: "https://pmc.ncbi.nlm.nih.gov/articles/PMC8553227/",
        tag: "Awareness",
    },
    Resource {
        title: "5 Tips for Women in STEM to Grow Their Careers",
        source: "Jenn Donahue",
        url: "https://www.jenndonahue.com/blog/how-women-can-succeed-in-stem-careers",
        tag: "Advice",
    },
];

pub fn all() -> &'static [Resource] {
    RESOURCES
}

/// Resources with the given tag (case-insensitive)
pub fn by_tag(tag: &str) -> Vec<Resource> {
    RESOURCES
        .iter()
        .filter(|r| r.tag.eq_ignore_ascii_case(tag))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_resources_are_well_formed() {
        assert_eq!(all().len(), 5);
        let tags: HashSet<_> = all().iter().map(|r| r.tag).collect();
        assert_eq!(tags.len(), 5);
        assert!(all().iter().all(|r| r.url.starts_with("https://")));
    }

    #[test]
    fn test_by_tag() {
        let found = by_tag("mentorship");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, "ASM.org");
        assert!(by_tag("Cooking").is_empty());
    }
}
