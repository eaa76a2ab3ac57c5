/// Structured result of parsing one inbound text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseResult {
    /// Whether a command prefix was detected.
    pub is_command: bool,
    /// Command token followed by the remaining whitespace-split fields.
    pub tokens: Vec<String>,
    /// The original input text.
    pub raw: String,
    /// Everything after the command token, trimmed.
    pub argument_raw: String,
}

/// Splits inbound text into command tokens.
///
/// Detection follows the Telegram `Message.IsCommand` convention: the first
/// whitespace-delimited field must start with the prefix and carry at least
/// one character after it. Anything from the first `@` in the command token
/// onward is dropped, so `/help@mybot` routes like `/help`.
#[derive(Debug, Clone)]
pub struct Parser {
    prefix: String,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self { prefix: "/".into() }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: if prefix.is_empty() { "/".into() } else { prefix },
        }
    }

    pub fn parse(&self, text: &str) -> ParseResult {
        let not_a_command = ParseResult {
            raw: text.to_string(),
            ..Default::default()
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return not_a_command;
        }

        let mut fields = trimmed.split_whitespace();
        let Some(first) = fields.next() else {
            return not_a_command;
        };
        let Some(stripped) = first.strip_prefix(&self.prefix) else {
            return not_a_command;
        };
        if stripped.is_empty() {
            return not_a_command;
        }

        let command_token = match stripped.find('@') {
            Some(idx) => &stripped[..idx],
            None => stripped,
        };
        if command_token.is_empty() {
            return not_a_command;
        }

        let mut tokens = vec![command_token.to_string()];
        tokens.extend(fields.map(str::to_string));

        let argument_raw = if tokens.len() > 1 {
            trimmed
                .strip_prefix(first)
                .unwrap_or_default()
                .trim()
                .to_string()
        } else {
            String::new()
        };

        ParseResult {
            is_command: true,
            tokens,
            raw: text.to_string(),
            argument_raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_are_not_commands() {
        let parser = Parser::new();
        for text in ["", "   ", "\n\t "] {
            let parsed = parser.parse(text);
            assert!(!parsed.is_command, "{text:?}");
            assert_eq!(parsed.raw, text);
        }
    }

    #[test]
    fn plain_text_is_not_a_command() {
        let parser = Parser::new();
        assert!(!parser.parse("hello world").is_command);
        assert!(!parser.parse("half/way").is_command);
    }

    #[test]
    fn bare_prefix_is_not_a_command() {
        let parser = Parser::new();
        assert!(!parser.parse("/").is_command);
        assert!(!parser.parse("/ arg").is_command);
        // The token is nothing but a mention.
        assert!(!parser.parse("/@bot hi").is_command);
    }

    #[test]
    fn simple_command() {
        let parsed = Parser::new().parse("/help");
        assert!(parsed.is_command);
        assert_eq!(parsed.tokens, vec!["help"]);
        assert_eq!(parsed.argument_raw, "");
    }

    #[test]
    fn command_with_args() {
        let parsed = Parser::new().parse("  /echo hello   world  ");
        assert!(parsed.is_command);
        assert_eq!(parsed.tokens, vec!["echo", "hello", "world"]);
        assert_eq!(parsed.argument_raw, "hello   world");
    }

    #[test]
    fn mention_is_stripped_from_command_token() {
        let parsed = Parser::new().parse("/status@mybot now");
        assert!(parsed.is_command);
        assert_eq!(parsed.tokens[0], "status");
        assert!(!parsed.tokens[0].contains('@'));
        assert_eq!(parsed.tokens[1], "now");
    }

    #[test]
    fn custom_prefix() {
        let parser = Parser::with_prefix("!");
        assert!(parser.parse("!ping").is_command);
        assert!(!parser.parse("/ping").is_command);
    }

    #[test]
    fn tokens_never_contain_whitespace() {
        let parsed = Parser::new().parse("/a b\tc\nd");
        assert!(parsed.is_command);
        for token in &parsed.tokens {
            assert!(!token.chars().any(char::is_whitespace));
        }
    }
}
