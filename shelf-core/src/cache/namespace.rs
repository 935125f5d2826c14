pub const FILESYSTEM: &str = "filesystem";
pub const EXTERNAL: &str = "external";
pub const THUMBNAIL: &str = "thumbnail";
pub const MEDIA: &str = "media";

pub const WILDCARD: &str = "*";

const SEPARATOR: char = '|';

pub fn parse(expr: &str) -> Vec<String> {
    let mut namespaces: Vec<String> = Vec::new();

    for part in expr.split(SEPARATOR).map(str::trim) {
        if part.is_empty() || namespaces.iter().any(|n| n == part) {
            continue;
        }
        namespaces.push(part.to_string());
    }

    namespaces
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceSelector {
    All,
    Only(Vec<String>),
}

impl NamespaceSelector {
    pub fn parse(expr: &str) -> Self {
        let namespaces = parse(expr);
        if namespaces.iter().any(|n| n == WILDCARD) {
            Self::All
        } else {
            Self::Only(namespaces)
        }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(namespaces) => namespaces.iter().any(|n| n == namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse("filesystem"), vec!["filesystem"]);
        assert_eq!(parse("filesystem|external"), vec!["filesystem", "external"]);
        assert_eq!(parse(" thumbnail | media |thumbnail|"), vec!["thumbnail", "media"]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_selector() {
        assert_eq!(NamespaceSelector::parse("*"), NamespaceSelector::All);
        assert!(NamespaceSelector::parse("x|*").matches("anything"));

        let only = NamespaceSelector::parse("x|y");
        assert!(only.matches("x"));
        assert!(!only.matches("z"));
    }
}
