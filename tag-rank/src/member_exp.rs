use crate::error::Result;
use crate::syntax::Anchor;
use crate::syntax::LanguageSyntax;
use crate::syntax::MemberExpSyntax;
use crate::syntax::SyntaxTable;
use crate::syntax::compile_alternation;
use log::debug;
use log::warn;
use regex::Regex;

/// Compiled receiver-chain scanner for one language.
#[derive(Debug, Clone)]
pub struct MemberExpParser {
    tokens: Regex,
    close: Vec<Regex>,
    open: Vec<Regex>,
    stop: Option<Regex>,
    ignore: Option<Regex>,
    splitters: Option<Regex>,
}

enum Token<'a> {
    Close(usize),
    Open(usize),
    Stop,
    Ignore,
    Text(&'a str),
}

impl MemberExpParser {
    /// Compile `syntax`. Returns `Ok(None)` when it has no `stop` tokens,
    /// since the scan would then never end at whitespace.
    pub fn compile(syntax: &MemberExpSyntax) -> Result<Option<Self>> {
        if syntax.stop().is_empty() {
            warn!("member_exp rules without 'stop' tokens are ignored");
            return Ok(None);
        }
        if syntax.open().len() != syntax.close().len() {
            warn!(
                "member_exp has {} open and {} close brackets; pairing them in order",
                syntax.open().len(),
                syntax.close().len()
            );
        }

        let delimiters: Vec<String> = [syntax.open(), syntax.close(), syntax.ignore(), syntax.stop()]
            .concat();
        let Some(tokens) = compile_alternation(&delimiters, Anchor::None, false)? else {
            return Ok(None);
        };
        let each = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .filter_map(|pattern| {
                    compile_alternation(std::slice::from_ref(pattern), Anchor::Full, false)
                        .transpose()
                })
                .collect()
        };

        Ok(Some(Self {
            tokens,
            close: each(syntax.close())?,
            open: each(syntax.open())?,
            stop: compile_alternation(syntax.stop(), Anchor::Full, false)?,
            ignore: compile_alternation(syntax.ignore(), Anchor::Full, false)?,
            splitters: compile_alternation(syntax.splitters(), Anchor::None, false)?,
        }))
    }

    fn classify<'a>(&self, delimiter: &'a str) -> Token<'a> {
        if let Some(index) = self.close.iter().position(|re| re.is_match(delimiter)) {
            Token::Close(index)
        } else if let Some(index) = self.open.iter().position(|re| re.is_match(delimiter)) {
            Token::Open(index)
        } else if self.stop.as_ref().is_some_and(|re| re.is_match(delimiter)) {
            Token::Stop
        } else if self.ignore.as_ref().is_some_and(|re| re.is_match(delimiter)) {
            Token::Ignore
        } else {
            Token::Text(delimiter)
        }
    }

    fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        let mut tokens = Vec::new();
        let mut last = 0;
        for found in self.tokens.find_iter(text) {
            if found.start() > last {
                tokens.push(Token::Text(&text[last..found.start()]));
            }
            if !found.as_str().is_empty() {
                tokens.push(self.classify(found.as_str()));
            }
            last = found.end();
        }
        if last < text.len() {
            tokens.push(Token::Text(&text[last..]));
        }
        tokens
    }

    /// Receiver chain ending at the end of `line_prefix`, outermost first.
    ///
    /// The prefix is scanned backwards. A close bracket enters an expression
    /// and any matched open bracket leaves it, so in nested calls only the
    /// innermost call shields its stop tokens. An unmatched open bracket, or a
    /// stop token outside an expression, ends the scan. The collected text is
    /// split on the member operators.
    pub fn extract(&self, line_prefix: &str) -> Vec<String> {
        let mut stack: Vec<usize> = Vec::new();
        let mut inside = false;
        let mut collected: Vec<&str> = Vec::new();

        for token in self.tokenize(line_prefix).into_iter().rev() {
            match token {
                Token::Close(index) => {
                    stack.push(index);
                    inside = true;
                }
                Token::Open(index) => {
                    let Some(close) = stack.pop() else {
                        break;
                    };
                    if close != index {
                        debug!("Mismatched brackets in {line_prefix:?}; stopping receiver scan");
                        break;
                    }
                    // Any matched open bracket leaves the expression, even a nested one.
                    inside = false;
                }
                Token::Stop => {
                    if !inside {
                        break;
                    }
                }
                Token::Ignore => {}
                Token::Text(text) => collected.push(text),
            }
        }

        collected.reverse();
        let expression = collected.concat();
        match &self.splitters {
            Some(splitters) => splitters
                .split(&expression)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
            None if expression.is_empty() => Vec::new(),
            None => vec![expression],
        }
    }
}

/// Receiver chain of the reference ending at `line_prefix`, for the language
/// whose rules are `syntax`.
///
/// Without usable `member_exp` rules the whole prefix comes back as a single
/// part.
pub fn extract_receiver_chain_with(line_prefix: &str, syntax: Option<&LanguageSyntax>) -> Vec<String> {
    let Some(member_exp) = syntax.and_then(|syntax| syntax.member_exp.as_ref()) else {
        return vec![line_prefix.to_string()];
    };
    match MemberExpParser::compile(member_exp) {
        Ok(Some(parser)) => parser.extract(line_prefix),
        Ok(None) => vec![line_prefix.to_string()],
        Err(err) => {
            warn!("Cannot compile member_exp rules: {err}");
            vec![line_prefix.to_string()]
        }
    }
}

/// [`extract_receiver_chain_with`] for the rules `table` holds for `language`.
pub fn extract_receiver_chain(line_prefix: &str, language: &str, table: &SyntaxTable) -> Vec<String> {
    extract_receiver_chain_with(line_prefix, table.resolve(language).as_ref())
}
