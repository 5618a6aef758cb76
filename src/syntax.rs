//! Comment preserving model of the Go module file grammar.
//!
//! The document keeps every statement in file order together with the comments
//! attached to it, so rewriting one directive leaves the rest of a hand-edited
//! file alone. Formatting a parsed document and parsing it again yields the same
//! document.

use std::path::Path;
use crate::error::BinpinError;
use crate::package::Module;

const KNOWN_VERBS: &[&str] = &[
    "module", "go", "toolchain", "godebug", "require", "exclude", "replace", "retract", "tool", "ignore",
];

/// One directive line: its leading comment lines, arguments and trailing `//` comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub comments: Vec<String>,
    pub args: Vec<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Directive { verb: String, line: Line },
    Block {
        verb: String,
        comments: Vec<String>,
        suffix: Option<String>,
        lines: Vec<Line>,
        /// Comments between the last line and the closing parenthesis.
        trailing: Vec<String>,
    },
    Comment(String),
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub module: Module,
    pub indirect: bool,
    pub comment: Option<String>,
}

/// `old [version] => new [version]`. Empty versions are omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replace {
    pub old: Module,
    pub new: Module,
}

impl Replace {
    fn args(&self) -> Vec<String> {
        let mut args = vec![quote(&self.old.path)];
        if !self.old.version.is_empty() {
            args.push(self.old.version.clone());
        }
        args.push("=>".to_string());
        args.push(quote(&self.new.path));
        if !self.new.version.is_empty() {
            args.push(self.new.version.clone());
        }
        args
    }

    fn from_args(args: &[String]) -> Option<Replace> {
        let arrow = args.iter().position(|a| a == "=>")?;
        let (old, new) = (&args[..arrow], &args[arrow + 1..]);
        let module = |side: &[String]| match side {
            [path] => Some(Module::new(unquote(path), "")),
            [path, version] => Some(Module::new(unquote(path), unquote(version))),
            _ => None,
        };
        Some(Replace { old: module(old)?, new: module(new)? })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModDocument {
    stmts: Vec<Stmt>,
}

impl ModDocument {
    /// Parses module file content. `path` is only used for error messages.
    pub fn parse(path: &Path, content: &str) -> Result<ModDocument, BinpinError> {
        let unparsable = |line: usize, reason: String| BinpinError::UnparsableManifest {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut stmts = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        let mut open: Option<(usize, Stmt)> = None;

        for (idx, raw) in content.lines().enumerate() {
            let lineno = idx + 1;
            let text = raw.trim();
            if text.is_empty() {
                if open.is_none() {
                    stmts.extend(pending.drain(..).map(Stmt::Comment));
                    stmts.push(Stmt::Blank);
                }
                continue;
            }
            if text.starts_with("//") {
                pending.push(text.to_string());
                continue;
            }

            let (tokens, suffix) = tokenize(text).map_err(|r| unparsable(lineno, r))?;

            if let Some((_, Stmt::Block { verb, lines, trailing, .. })) = open.as_mut() {
                if tokens == [")"] {
                    trailing.append(&mut pending);
                    if let Some((_, block)) = open.take() {
                        stmts.push(block);
                    }
                    continue;
                }
                validate(verb, &tokens).map_err(|r| unparsable(lineno, r))?;
                lines.push(Line { comments: std::mem::take(&mut pending), args: tokens, suffix });
                continue;
            }

            let verb = tokens[0].clone();
            if !KNOWN_VERBS.contains(&verb.as_str()) {
                return Err(unparsable(lineno, format!("unknown directive: {}", verb)));
            }
            let args = tokens[1..].to_vec();
            if args == ["("] || args == ["(", ")"] {
                let block = Stmt::Block {
                    verb,
                    comments: std::mem::take(&mut pending),
                    suffix,
                    lines: Vec::new(),
                    trailing: Vec::new(),
                };
                if args.len() == 1 {
                    open = Some((lineno, block));
                } else {
                    stmts.push(block);
                }
                continue;
            }
            validate(&verb, &args).map_err(|r| unparsable(lineno, r))?;
            stmts.push(Stmt::Directive {
                verb,
                line: Line { comments: std::mem::take(&mut pending), args, suffix },
            });
        }

        if let Some((lineno, _)) = open {
            return Err(unparsable(lineno, "unterminated block, missing ')'".to_string()));
        }
        stmts.extend(pending.into_iter().map(Stmt::Comment));

        let mut doc = ModDocument { stmts };
        doc.tidy();
        if doc.module_path().is_none() {
            return Err(unparsable(0, "no module directive".to_string()));
        }
        Ok(doc)
    }

    pub fn module_path(&self) -> Option<String> {
        self.module_line().and_then(|l| l.args.first()).map(|p| unquote(p))
    }

    pub fn module_suffix(&self) -> Option<&str> {
        self.module_line().and_then(|l| l.suffix.as_deref())
    }

    pub fn set_module_suffix(&mut self, comment: &str) {
        for stmt in &mut self.stmts {
            if let Stmt::Directive { verb, line } = stmt {
                if verb == "module" {
                    line.suffix = Some(comment.to_string());
                    return;
                }
            }
        }
    }

    fn module_line(&self) -> Option<&Line> {
        self.stmts.iter().find_map(|s| match s {
            Stmt::Directive { verb, line } if verb == "module" => Some(line),
            _ => None,
        })
    }

    fn lines_of<'a>(&'a self, wanted: &'a str) -> impl Iterator<Item = &'a Line> + 'a {
        self.stmts.iter().flat_map(move |s| match s {
            Stmt::Directive { verb, line } if verb == wanted => std::slice::from_ref(line),
            Stmt::Block { verb, lines, .. } if verb == wanted => lines.as_slice(),
            _ => &[][..],
        })
    }

    /// All require entries in file order.
    pub fn requires(&self) -> Vec<Require> {
        self.lines_of("require")
            .map(|l| Require {
                module: Module::new(unquote(&l.args[0]), unquote(&l.args[1])),
                indirect: l.suffix.as_deref().is_some_and(is_indirect_comment),
                comment: l.suffix.clone(),
            })
            .collect()
    }

    pub fn replaces(&self) -> Vec<Replace> {
        self.lines_of("replace").filter_map(|l| Replace::from_args(&l.args)).collect()
    }

    /// Every comment in the document, attached or free standing.
    pub fn comments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for stmt in &self.stmts {
            match stmt {
                Stmt::Comment(c) => out.push(c.as_str()),
                Stmt::Directive { line, .. } => push_line_comments(&mut out, line),
                Stmt::Block { comments, suffix, lines, trailing, .. } => {
                    out.extend(comments.iter().map(String::as_str));
                    out.extend(suffix.as_deref());
                    for l in lines {
                        push_line_comments(&mut out, l);
                    }
                    out.extend(trailing.iter().map(String::as_str));
                }
                Stmt::Blank => {}
            }
        }
        out
    }

    /// Removes every require directive, including the ones inside blocks.
    pub fn drop_requires(&mut self) {
        self.drop_verb("require");
    }

    /// Appends a single line require directive at the end of the document.
    pub fn add_require(&mut self, module: &Module, comment: Option<String>) {
        self.push_separated(Stmt::Directive {
            verb: "require".to_string(),
            line: Line {
                comments: Vec::new(),
                args: vec![quote(&module.path), module.version.clone()],
                suffix: comment,
            },
        });
    }

    /// Replaces all replace directives with the given ones.
    pub fn set_replaces(&mut self, replaces: &[Replace]) {
        self.drop_verb("replace");
        match replaces {
            [] => {}
            [single] => self.push_separated(Stmt::Directive {
                verb: "replace".to_string(),
                line: Line { args: single.args(), ..Default::default() },
            }),
            many => self.push_separated(Stmt::Block {
                verb: "replace".to_string(),
                comments: Vec::new(),
                suffix: None,
                lines: many.iter().map(|r| Line { args: r.args(), ..Default::default() }).collect(),
                trailing: Vec::new(),
            }),
        }
    }

    fn drop_verb(&mut self, wanted: &str) {
        self.stmts.retain(|s| !matches!(s, Stmt::Directive { verb, .. } if verb == wanted));
        for stmt in &mut self.stmts {
            if let Stmt::Block { verb, lines, .. } = stmt {
                if verb == wanted {
                    lines.clear();
                }
            }
        }
        self.tidy();
    }

    fn push_separated(&mut self, stmt: Stmt) {
        if !matches!(self.stmts.last(), None | Some(Stmt::Blank)) {
            self.stmts.push(Stmt::Blank);
        }
        self.stmts.push(stmt);
    }

    /// Drops empty blocks, collapses blank runs and trims blank lines at both ends.
    fn tidy(&mut self) {
        self.stmts.retain(|s| !matches!(s, Stmt::Block { lines, .. } if lines.is_empty()));
        self.stmts.dedup_by(|a, b| matches!((a, b), (Stmt::Blank, Stmt::Blank)));
        while matches!(self.stmts.first(), Some(Stmt::Blank)) {
            self.stmts.remove(0);
        }
        while matches!(self.stmts.last(), Some(Stmt::Blank)) {
            self.stmts.pop();
        }
    }

    pub fn format(&self) -> String {
        let mut out = String::new();
        for stmt in &self.stmts {
            match stmt {
                Stmt::Blank => out.push('\n'),
                Stmt::Comment(c) => {
                    out.push_str(c);
                    out.push('\n');
                }
                Stmt::Directive { verb, line } => {
                    for c in &line.comments {
                        out.push_str(c);
                        out.push('\n');
                    }
                    out.push_str(verb);
                    out.push(' ');
                    format_line(&mut out, line);
                }
                Stmt::Block { verb, comments, suffix, lines, trailing } => {
                    for c in comments {
                        out.push_str(c);
                        out.push('\n');
                    }
                    out.push_str(verb);
                    out.push_str(" (");
                    if let Some(s) = suffix {
                        out.push(' ');
                        out.push_str(s);
                    }
                    out.push('\n');
                    for l in lines {
                        for c in &l.comments {
                            out.push('\t');
                            out.push_str(c);
                            out.push('\n');
                        }
                        out.push('\t');
                        format_line(&mut out, l);
                    }
                    for c in trailing {
                        out.push('\t');
                        out.push_str(c);
                        out.push('\n');
                    }
                    out.push_str(")\n");
                }
            }
        }
        out
    }
}

fn push_line_comments<'a>(out: &mut Vec<&'a str>, line: &'a Line) {
    out.extend(line.comments.iter().map(String::as_str));
    out.extend(line.suffix.as_deref());
}

fn format_line(out: &mut String, line: &Line) {
    out.push_str(&line.args.join(" "));
    if let Some(s) = &line.suffix {
        out.push(' ');
        out.push_str(s);
    }
    out.push('\n');
}

/// Strips the leading `//` and surrounding whitespace of a comment.
pub fn comment_text(comment: &str) -> &str {
    comment.trim_start_matches("//").trim()
}

fn is_indirect_comment(comment: &str) -> bool {
    let text = comment_text(comment);
    text == "indirect" || text.starts_with("indirect;")
}

fn validate(verb: &str, args: &[String]) -> Result<(), String> {
    let ok = match verb {
        "module" | "go" | "toolchain" => args.len() == 1,
        "require" | "exclude" => args.len() == 2,
        "replace" => Replace::from_args(args).is_some(),
        _ => !args.is_empty(),
    };
    if ok {
        Ok(())
    } else {
        Err(format!("invalid {} directive: {:?}", verb, args.join(" ")))
    }
}

/// Splits a line into tokens and its trailing `//` comment.
/// Parentheses and `=>` are tokens on their own; quoted strings stay whole.
fn tokenize(text: &str) -> Result<(Vec<String>, Option<String>), String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut cur = String::new();
    let mut suffix = None;
    let flush = |cur: &mut String, tokens: &mut Vec<String>| {
        if !cur.is_empty() {
            tokens.push(std::mem::take(cur));
        }
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '"' | '`' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    if c == '"' && chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated quoted string".to_string());
                }
                cur.extend(&chars[start..=i]);
            }
            '/' if next == Some('/') => {
                flush(&mut cur, &mut tokens);
                suffix = Some(chars[i..].iter().collect::<String>().trim_end().to_string());
                break;
            }
            '(' | ')' => {
                flush(&mut cur, &mut tokens);
                tokens.push(c.to_string());
            }
            '=' if next == Some('>') => {
                flush(&mut cur, &mut tokens);
                tokens.push("=>".to_string());
                i += 1;
            }
            c if c.is_whitespace() => flush(&mut cur, &mut tokens),
            c => cur.push(c),
        }
        i += 1;
    }
    flush(&mut cur, &mut tokens);
    if tokens.is_empty() {
        return Err("expected a directive".to_string());
    }
    Ok((tokens, suffix))
}

fn unquote(token: &str) -> String {
    let quoted = token.len() >= 2
        && ((token.starts_with('"') && token.ends_with('"')) || (token.starts_with('`') && token.ends_with('`')));
    if quoted {
        token[1..token.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        token.to_string()
    }
}

fn quote(path: &str) -> String {
    if path.chars().any(|c| c.is_whitespace() || c == '"' || c == '(' || c == ')') {
        format!("{:?}", path)
    } else {
        path.to_string()
    }
}
