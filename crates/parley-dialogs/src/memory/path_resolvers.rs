//! Shorthand path aliases expanded before scope resolution

/// Rewrites a path before it is resolved against the memory scopes
pub trait PathResolver: Send + Sync {
    /// Expand the path; paths the resolver does not recognise pass through
    fn transform_path(&self, path: &str) -> String;
}

fn is_path_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Replaces a leading alias with a prefix, e.g. `$name` to `dialog.name`
#[derive(Debug, Clone)]
pub struct AliasPathResolver {
    alias: String,
    prefix: String,
    postfix: String,
}

impl AliasPathResolver {
    /// Create an alias resolver
    pub fn new(alias: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            alias: alias.into().trim().to_string(),
            prefix: prefix.into().trim().to_string(),
            postfix: String::new(),
        }
    }

    /// Text appended after the expanded path
    pub fn with_postfix(mut self, postfix: impl Into<String>) -> Self {
        self.postfix = postfix.into().trim().to_string();
        self
    }

    /// `$x` expands to `dialog.x`
    pub fn dollar() -> Self {
        Self::new("$", "dialog.")
    }

    /// `#x` expands to `turn.recognized.intents.x`
    pub fn hash() -> Self {
        Self::new("#", "turn.recognized.intents.")
    }

    /// `@@x` expands to `turn.recognized.entities.x`
    pub fn at_at() -> Self {
        Self::new("@@", "turn.recognized.entities.")
    }

    /// `%x` expands to `class.x`
    pub fn percent() -> Self {
        Self::new("%", "class.")
    }
}

impl PathResolver for AliasPathResolver {
    fn transform_path(&self, path: &str) -> String {
        let path = path.trim();
        match path.strip_prefix(self.alias.as_str()) {
            Some(rest) if rest.chars().next().map_or(false, is_path_char) => {
                let expanded = format!("{}{}{}", self.prefix, rest, self.postfix);
                expanded.trim_end_matches('.').to_string()
            }
            _ => path.to_string(),
        }
    }
}

/// `@x` expands to the first recognized entity: `turn.recognized.entities.x.first()`.
///
/// Anything after the entity name (`.prop` or `[..]`) is kept after `.first()`.
#[derive(Debug, Clone, Default)]
pub struct AtPathResolver;

const ENTITIES_PREFIX: &str = "turn.recognized.entities.";

impl PathResolver for AtPathResolver {
    fn transform_path(&self, path: &str) -> String {
        let path = path.trim();
        match path.strip_prefix('@') {
            Some(rest) if rest.chars().next().map_or(false, is_path_char) => {
                let end = rest.find(|c| c == '.' || c == '[').unwrap_or(rest.len());
                let (property, suffix) = rest.split_at(end);
                format!("{}{}.first(){}", ENTITIES_PREFIX, property, suffix)
            }
            _ => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtins() -> Vec<Box<dyn PathResolver>> {
        vec![
            Box::new(AliasPathResolver::dollar()),
            Box::new(AliasPathResolver::hash()),
            Box::new(AliasPathResolver::at_at()),
            Box::new(AtPathResolver),
            Box::new(AliasPathResolver::percent()),
        ]
    }

    fn transform(path: &str) -> String {
        builtins()
            .iter()
            .fold(path.to_string(), |path, resolver| resolver.transform_path(&path))
    }

    #[test]
    fn test_builtin_aliases() {
        assert_eq!(transform("$name"), "dialog.name");
        assert_eq!(transform("#greeting"), "turn.recognized.intents.greeting");
        assert_eq!(transform("@@city"), "turn.recognized.entities.city");
        assert_eq!(transform("@city"), "turn.recognized.entities.city.first()");
        assert_eq!(
            transform("@city.name"),
            "turn.recognized.entities.city.first().name"
        );
        assert_eq!(
            transform("@city[0]"),
            "turn.recognized.entities.city.first()[0]"
        );
        assert_eq!(transform("%id"), "class.id");
        assert_eq!(transform("  $padded  "), "dialog.padded");
    }

    #[test]
    fn test_alias_requires_path_char() {
        assert_eq!(transform("$"), "$");
        assert_eq!(transform("$1"), "$1");
        assert_eq!(transform("@.x"), "@.x");
        assert_eq!(transform("conversation.total$"), "conversation.total$");
    }

    #[test]
    fn test_transform_is_idempotent() {
        for path in ["$a.b", "#intent", "@@e", "@e.x", "%p", "user.name", "turn[0]"] {
            let once = transform(path);
            assert_eq!(transform(&once), once, "transforming {} twice", path);
        }
    }
}
