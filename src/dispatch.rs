//! RCMD command dispatch.
//!
//! Every input line passes through here before reaching a shell.
//! Resolution order, first match wins: exact alias on the command word,
//! then builtin utilities, then forward the raw line to the pane's
//! shell. The dispatcher only resolves; structural builtins come back
//! as [`Builtin`] data for the workspace to apply, so the dispatcher
//! never holds the tree.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::types::{NodeId, Orientation, PaneId};

const MAX_ALIAS_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The line was consumed internally.
    Handled(Handled),
    /// Not ours; pass this text unmodified to the owning shell. Alias
    /// expansion may have rewritten the command word.
    Forwarded(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    /// A structural or session operation for the workspace to apply.
    Builtin(Builtin),
    /// Text to inject into the pane's stream (help output).
    Text(String),
    /// A malformed internal command. Reported, never silently forwarded.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    Split { orientation: Orientation, ratio: Option<f32> },
    ClosePane,
    Focus { pane: PaneId },
    NewTab { name: Option<String> },
    RenameTab { name: String },
    CloseTab,
    DuplicateTab,
    Resize { split: NodeId, ratio: f32 },
    SaveSession { path: PathBuf },
    LoadSession { path: PathBuf },
    /// `elevate` alone re-launches the whole pane elevated; with a
    /// trailing command it runs just that command elevated.
    Elevate { command: Option<String> },
    Cd { target: Option<String> },
    Clear,
    Run { script: PathBuf },
}

const HELP_TEXT: &str = "\
cmdmux commands:
  split-h [ratio]        split the focused pane side by side
  split-v [ratio]        split the focused pane top/bottom
  close-pane             close the focused pane
  focus <pane>           focus pane by id (%N or N)
  new-tab [name]         open a tab
  rename-tab <name>      rename the active tab
  duplicate-tab          clone the active tab (same dialect and cwd)
  close-tab              close the active tab
  resize <split> <ratio> set a split's ratio (@N or N, ratio in (0, 1))
  save-session <path>    write the session to a file
  load-session <path>    replace the session from a file
  elevate [command]      run one command, or relaunch the pane, elevated
  cd [dir]               change the pane's directory
  clear                  clear the pane
  run <file.rcmd>        replay commands from a script file
  help                   this text";

pub struct Dispatcher {
    aliases: HashMap<String, String>,
}

impl Dispatcher {
    pub fn new(aliases: HashMap<String, String>) -> Dispatcher {
        Dispatcher { aliases }
    }

    pub fn define_alias(&mut self, name: impl Into<String>, expansion: impl Into<String>) {
        self.aliases.insert(name.into(), expansion.into());
    }

    /// Load `name = expansion` definitions, one per line. Blank lines
    /// and `#` comments are skipped; malformed lines are reported back.
    pub fn load_aliases(&mut self, text: &str) -> Vec<String> {
        let mut rejected = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_alias_line(line) {
                Some((name, expansion)) => {
                    self.aliases.insert(name, expansion);
                }
                None => rejected.push(line.to_string()),
            }
        }
        rejected
    }

    pub fn dispatch(&self, line: &str) -> Dispatch {
        let mut line = line.trim().to_string();
        if line.is_empty() {
            return Dispatch::Forwarded(line);
        }

        // Alias expansion rewrites the command word; chains are allowed
        // but cycles are cut off at a fixed depth.
        for _ in 0..MAX_ALIAS_DEPTH {
            let Some(word) = first_word(&line) else { break };
            let Some(expansion) = self.aliases.get(word) else { break };
            let rest = line[word.len()..].to_string();
            debug!(alias = word, "alias expanded");
            line = format!("{expansion}{rest}");
        }

        let tokens = tokenize(&line);
        let Some(word) = tokens.first() else {
            return Dispatch::Forwarded(line);
        };
        match word.as_str() {
            "split-h" => parse_split(Orientation::Horizontal, &tokens),
            "split-v" => parse_split(Orientation::Vertical, &tokens),
            "close-pane" => exact(&tokens, 1, Builtin::ClosePane),
            "focus" => parse_focus(&tokens),
            "new-tab" => match tokens.len() {
                1 => handled(Builtin::NewTab { name: None }),
                2 => handled(Builtin::NewTab { name: Some(tokens[1].clone()) }),
                _ => arg_error("usage: new-tab [name]"),
            },
            "rename-tab" => match tokens.len() {
                2 => handled(Builtin::RenameTab { name: tokens[1].clone() }),
                _ => arg_error("usage: rename-tab <name>"),
            },
            "duplicate-tab" => exact(&tokens, 1, Builtin::DuplicateTab),
            "close-tab" => exact(&tokens, 1, Builtin::CloseTab),
            "resize" => parse_resize(&tokens),
            "save-session" => parse_path(&tokens, |path| Builtin::SaveSession { path }, "save-session"),
            "load-session" => parse_path(&tokens, |path| Builtin::LoadSession { path }, "load-session"),
            "elevate" => {
                let command = rest_of_line(&line, "elevate");
                handled(Builtin::Elevate { command })
            }
            "cd" => match tokens.len() {
                1 => handled(Builtin::Cd { target: None }),
                2 => handled(Builtin::Cd { target: Some(tokens[1].clone()) }),
                _ => arg_error("usage: cd [dir]"),
            },
            "clear" | "cls" => exact(&tokens, 1, Builtin::Clear),
            "run" => match tokens.len() {
                2 => handled(Builtin::Run { script: PathBuf::from(&tokens[1]) }),
                _ => arg_error("usage: run <file.rcmd>"),
            },
            "help" => Dispatch::Handled(Handled::Text(HELP_TEXT.to_string())),
            _ => Dispatch::Forwarded(line),
        }
    }
}

fn handled(builtin: Builtin) -> Dispatch {
    Dispatch::Handled(Handled::Builtin(builtin))
}

fn arg_error(msg: &str) -> Dispatch {
    Dispatch::Handled(Handled::Error(msg.to_string()))
}

fn exact(tokens: &[String], count: usize, builtin: Builtin) -> Dispatch {
    if tokens.len() == count {
        handled(builtin)
    } else {
        arg_error(&format!("{} takes no arguments", tokens[0]))
    }
}

fn parse_split(orientation: Orientation, tokens: &[String]) -> Dispatch {
    match tokens.len() {
        1 => handled(Builtin::Split { orientation, ratio: None }),
        2 => match tokens[1].parse::<f32>() {
            Ok(ratio) => handled(Builtin::Split { orientation, ratio: Some(ratio) }),
            Err(_) => arg_error(&format!("{}: ratio must be a number in (0, 1)", tokens[0])),
        },
        _ => arg_error(&format!("usage: {} [ratio]", tokens[0])),
    }
}

fn parse_focus(tokens: &[String]) -> Dispatch {
    if tokens.len() != 2 {
        return arg_error("usage: focus <pane>");
    }
    match parse_id(&tokens[1], '%') {
        Some(n) => handled(Builtin::Focus { pane: PaneId(n) }),
        None => arg_error("focus: pane id must be %N or N"),
    }
}

fn parse_resize(tokens: &[String]) -> Dispatch {
    if tokens.len() != 3 {
        return arg_error("usage: resize <split> <ratio>");
    }
    let Some(n) = parse_id(&tokens[1], '@') else {
        return arg_error("resize: split id must be @N or N");
    };
    match tokens[2].parse::<f32>() {
        Ok(ratio) => handled(Builtin::Resize { split: NodeId(n), ratio }),
        Err(_) => arg_error("resize: ratio must be a number in (0, 1)"),
    }
}

fn parse_path(tokens: &[String], make: impl Fn(PathBuf) -> Builtin, name: &str) -> Dispatch {
    match tokens.len() {
        2 => handled(make(PathBuf::from(&tokens[1]))),
        _ => arg_error(&format!("usage: {name} <path>")),
    }
}

/// Accepts `%3`, `@3` or bare `3` depending on the expected sigil.
fn parse_id(token: &str, sigil: char) -> Option<u64> {
    token.strip_prefix(sigil).unwrap_or(token).parse().ok()
}

fn first_word(line: &str) -> Option<&str> {
    let word = line.split_whitespace().next()?;
    Some(word)
}

/// Everything after the command word, or `None` when there is nothing.
fn rest_of_line(line: &str, word: &str) -> Option<String> {
    let rest = line[word.len()..].trim();
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

/// Quote-aware tokenization: double or single quotes group words and
/// are stripped from the token.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in line.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// One `name = expansion` alias definition.
fn parse_alias_line(line: &str) -> Option<(String, String)> {
    let (name, expansion) = line.split_once('=')?;
    let name = name.trim();
    let expansion = expansion.trim();
    if name.is_empty() || expansion.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), expansion.to_string()))
}
