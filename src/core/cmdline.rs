//! PG-002: `cmds` line splitting and shell quoting.
//!
//! Commands are run without a shell, so each line is split into an argv
//! here, once, at load time. Shell operators are rejected instead of being
//! passed through as literal arguments.

use super::types::PgCommand;

/// Split a command line into words, honouring single quotes, double quotes
/// and backslash escapes.
pub fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\' | '$' | '`')) => current.push(esc),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some('`') => return Err("command substitution is not supported".to_string()),
                        Some('$') if chars.peek() == Some(&'(') => {
                            return Err("command substitution is not supported".to_string())
                        }
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("trailing backslash".to_string()),
                }
            }
            '|' | ';' | '&' | '<' | '>' | '`' => {
                return Err(format!("shell operator '{}' is not supported", c));
            }
            '$' if chars.peek() == Some(&'(') => {
                return Err("command substitution is not supported".to_string());
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Parse one non-empty `cmds` line into a [`PgCommand`].
pub fn parse_command(line: &str) -> Result<PgCommand, String> {
    let mut words = split_words(line)?;
    if words.is_empty() {
        return Err("empty command".to_string());
    }
    let program = words.remove(0);
    if !is_program_name(&program) {
        return Err(format!(
            "'{}' must be the name of an executable in the PostgreSQL bin directory",
            program
        ));
    }
    Ok(PgCommand {
        program,
        args: words,
        line: line.trim().to_string(),
    })
}

/// Bare executable name: `[A-Za-z0-9_.-]+`, not starting with a dot.
fn is_program_name(word: &str) -> bool {
    !word.is_empty()
        && !word.starts_with('.')
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Split a multi-line `cmds` value. Blank lines and `#` comments are skipped.
/// Errors carry the 1-based line number.
pub fn parse_commands(value: &str) -> Result<Vec<PgCommand>, String> {
    let mut cmds = Vec::new();
    for (n, raw) in value.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cmd = parse_command(line).map_err(|e| format!("line {}: {}", n + 1, e))?;
        cmds.push(cmd);
    }
    Ok(cmds)
}

/// Quote a word for a POSIX shell. Safe words are left bare.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ',' | '+' | '@'));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Quote and join an argv.
pub fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
