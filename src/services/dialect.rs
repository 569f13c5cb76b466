// Placeholder dialect translation
//
// Query templates in this crate are written with `?` positional markers.
// PostgreSQL wants numbered `$1, $2, ...` markers instead; SQLite and MySQL
// take the template as written.

use std::fmt::Write;

/// The placeholder marker used in query templates
pub const PLACEHOLDER: char = '?';

/// SQL placeholder convention of the active backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
    /// `?` markers bound in order (SQLite, MySQL)
    Positional,
}

impl Dialect {
    /// Classify a host driver name such as `postgres`, `mysql` or `sqlite3`
    pub fn from_driver_name(driver_name: &str) -> Self {
        if driver_name.to_lowercase().contains("postgres") {
            Dialect::Numbered
        } else {
            Dialect::Positional
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Numbered => "numbered",
            Dialect::Positional => "positional",
        }
    }

    /// Rewrite the `?` markers of `query` for this dialect.
    ///
    /// The marker must not appear inside string literals of the template.
    pub fn translate(&self, query: &str) -> String {
        match self {
            Dialect::Positional => query.to_string(),
            Dialect::Numbered => {
                let mut result = String::with_capacity(query.len() + 8);
                let mut param_num = 1;
                for ch in query.chars() {
                    if ch == PLACEHOLDER {
                        // Writing into a String cannot fail
                        let _ = write!(result, "${}", param_num);
                        param_num += 1;
                    } else {
                        result.push(ch);
                    }
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "SELECT x FROM t WHERE a = ? AND b = ?";

    #[test]
    fn test_numbered_translation() {
        assert_eq!(
            Dialect::Numbered.translate(TEMPLATE),
            "SELECT x FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn test_positional_translation_is_identity() {
        assert_eq!(Dialect::Positional.translate(TEMPLATE), TEMPLATE);
    }

    #[test]
    fn test_numbered_tokens_increase_from_one() {
        let query = "VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let translated = Dialect::Numbered.translate(query);
        assert!(!translated.contains('?'));

        let numbers: Vec<u32> = translated
            .split('$')
            .skip(1)
            .map(|s| {
                s.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
                    .parse()
                    .unwrap()
            })
            .collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<u32>>());
    }

    #[test]
    fn test_translation_without_markers_is_noop() {
        let once = Dialect::Numbered.translate(TEMPLATE);
        assert_eq!(Dialect::Numbered.translate(&once), once);

        let plain = "SELECT PluginId, PKey FROM PluginKeyValueStore ORDER BY PluginId, PKey";
        assert_eq!(Dialect::Numbered.translate(plain), plain);
    }

    #[test]
    fn test_non_ascii_text_is_preserved() {
        assert_eq!(
            Dialect::Numbered.translate("SELECT 'é' WHERE k = ?"),
            "SELECT 'é' WHERE k = $1"
        );
    }

    #[test]
    fn test_from_driver_name() {
        assert_eq!(Dialect::from_driver_name("postgres"), Dialect::Numbered);
        assert_eq!(Dialect::from_driver_name("PostgreSQL"), Dialect::Numbered);
        assert_eq!(Dialect::from_driver_name("mysql"), Dialect::Positional);
        assert_eq!(Dialect::from_driver_name("sqlite3"), Dialect::Positional);
    }
}
