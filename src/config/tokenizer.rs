use crate::config::error::{ConfigError, ConfigResult};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub type Token = String;

/// Reads a configuration file and splits it into tokens.
pub fn tokenize_file(path: &Path) -> ConfigResult<Vec<Token>> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConfigError::FileNotFound,
        ErrorKind::PermissionDenied => ConfigError::PermissionDenied,
        ErrorKind::InvalidData => ConfigError::MalformedFile,
        _ => ConfigError::Io(e),
    })?;

    if content.is_empty() {
        return Err(ConfigError::FileEmpty);
    }

    tokenize(&content)
}

/// Splits configuration text into a flat token stream.
///
/// Comments are stripped, `{` and `}` become standalone tokens wherever they
/// appear inside a word, and a trailing `;` is peeled off into its own token.
/// Brace balance is verified once the whole input is consumed.
pub fn tokenize(content: &str) -> ConfigResult<Vec<Token>> {
    let mut tokens = Vec::new();

    for raw_line in content.lines() {
        let line = match raw_line.find('#') {
            Some(pos) => &raw_line[..pos],
            None => raw_line,
        };
        if line.trim().is_empty() {
            continue;
        }

        for word in line.split_whitespace() {
            split_word(word, &mut tokens);
        }
    }

    check_balance(&tokens)?;
    Ok(tokens)
}

fn split_word(word: &str, tokens: &mut Vec<Token>) {
    let mut rest = word;

    loop {
        match rest.find(['{', '}']) {
            Some(pos) => {
                if pos > 0 {
                    push_with_semicolon(&rest[..pos], tokens);
                }
                tokens.push(rest[pos..pos + 1].to_string());
                rest = &rest[pos + 1..];
            }
            None => {
                if !rest.is_empty() {
                    push_with_semicolon(rest, tokens);
                }
                return;
            }
        }
    }
}

fn push_with_semicolon(word: &str, tokens: &mut Vec<Token>) {
    match word.strip_suffix(';') {
        Some(value) => {
            if !value.is_empty() {
                tokens.push(value.to_string());
            }
            tokens.push(";".to_string());
        }
        None => tokens.push(word.to_string()),
    }
}

fn check_balance(tokens: &[Token]) -> ConfigResult<()> {
    let mut balance: i64 = 0;

    for token in tokens {
        match token.as_str() {
            "{" => balance += 1,
            "}" => balance -= 1,
            _ => {}
        }
        if balance < 0 {
            return Err(ConfigError::MalformedFile);
        }
    }

    if balance != 0 {
        return Err(ConfigError::UnexpectedEof);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(input: &str) -> Vec<String> {
        tokenize(input).unwrap()
    }

    #[test]
    fn splits_braces_and_semicolons() {
        assert_eq!(
            toks("server{\n listen 8080;\n}"),
            vec!["server", "{", "listen", "8080", ";", "}"]
        );
    }

    #[test]
    fn standalone_semicolon_is_kept() {
        assert_eq!(toks("host 127.0.0.1 ;"), vec!["host", "127.0.0.1", ";"]);
    }

    #[test]
    fn closing_brace_glued_to_value() {
        assert_eq!(
            toks("location / { autoindex on;}"),
            vec!["location", "/", "{", "autoindex", "on", ";", "}"]
        );
    }

    #[test]
    fn strips_comments() {
        let input = "# full line\n   # indented comment\nlisten 8080; # trailing\n\n";
        assert_eq!(toks(input), vec!["listen", "8080", ";"]);
    }

    #[test]
    fn stray_closing_brace_is_malformed() {
        assert!(matches!(tokenize("} server {"), Err(ConfigError::MalformedFile)));
    }

    #[test]
    fn unclosed_block_is_unexpected_eof() {
        assert!(matches!(
            tokenize("server { location / {\n}"),
            Err(ConfigError::UnexpectedEof)
        ));
    }

    #[test]
    fn balanced_nesting_passes() {
        assert!(tokenize("a { b { c { } } } d { }").is_ok());
    }

    #[test]
    fn empty_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.conf");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(tokenize_file(&path), Err(ConfigError::FileEmpty)));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.conf");
        assert!(matches!(tokenize_file(&path), Err(ConfigError::FileNotFound)));
    }
}
