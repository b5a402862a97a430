use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag, take_until},
    character::complete::{alphanumeric1, char, multispace0, multispace1, none_of},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use super::dom::{Document, NodeId};

/// One event of the markup stream. Tag and attribute names are folded to
/// lower-case; self-closing tags are emitted as a plain `StartTag` (the
/// trailing slash is ignored, leaving the element open on the builder stack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        name: String,
        attributes: Vec<(String, String)>,
    },
    EndTag(String),
    Text(String),
}

/// Attempt to parse a string as a valid tag name
fn parse_tag_name(input: &str) -> IResult<&str, &str> {
    alphanumeric1(input)
}

/// Parse a tag in the form `</name>`, returning `name`
fn parse_close_tag(input: &str) -> IResult<&str, &str> {
    let (remaining, (_, name, _, _)) =
        tuple((tag("</"), parse_tag_name, multispace0, char('>')))(input)?;
    Ok((remaining, name))
}

/// Parse a tag in the form `<name attr=value ...>`, returning the name and
/// attribute pairs. A trailing `/` is tolerated and dropped.
fn parse_open_tag(input: &str) -> IResult<&str, (String, Vec<(String, String)>)> {
    let (rest, (_, inner, _)) = tuple((char('<'), take_until(">"), char('>')))(input)?;
    let inner = inner.trim_end().trim_end_matches('/');
    let (remaining, name) = parse_tag_name(inner)?;
    let attributes = match preceded(multispace1, all_attr_parser)(remaining) {
        Ok((_, attrs)) => attrs
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    };
    Ok((rest, (name.to_ascii_lowercase(), attributes)))
}

fn parse_comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("<!--"), take_until("-->"), tag("-->"))(input)
}

/// `<!DOCTYPE ...>` and other markup declarations
fn parse_declaration(input: &str) -> IResult<&str, &str> {
    delimited(tag("<!"), take_until(">"), char('>'))(input)
}

fn parse_processing(input: &str) -> IResult<&str, &str> {
    delimited(tag("<?"), take_until(">"), char('>'))(input)
}

fn parse_text(input: &str) -> IResult<&str, &str> {
    is_not("<")(input)
}

/// Everything up to the closing tag of a raw-text element (`script`/`style`),
/// matched case-insensitively. The close tag itself is left in the input.
fn take_raw_text<'a>(input: &'a str, name: &str) -> (&'a str, &'a str) {
    let close = format!("</{}", name);
    match input.to_ascii_lowercase().find(&close) {
        Some(pos) => (&input[pos..], &input[..pos]),
        None => ("", input),
    }
}

/// Tokenizes markup leniently: anything that does not parse as a tag,
/// comment or declaration is consumed as character data. Never fails.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        if let Ok((r, _)) = parse_comment(rest) {
            rest = r;
            continue;
        }
        if let Ok((r, _)) = parse_processing(rest) {
            rest = r;
            continue;
        }
        if let Ok((r, _)) = parse_declaration(rest) {
            rest = r;
            continue;
        }
        if let Ok((r, name)) = parse_close_tag(rest) {
            tokens.push(Token::EndTag(name.to_ascii_lowercase()));
            rest = r;
            continue;
        }
        if let Ok((r, (name, attributes))) = parse_open_tag(rest) {
            let raw_content = matches!(name.as_str(), "script" | "style").then(|| name.clone());
            tokens.push(Token::StartTag { name, attributes });
            rest = r;
            if let Some(name) = raw_content {
                let (r, text) = take_raw_text(rest, &name);
                if !text.is_empty() {
                    tokens.push(Token::Text(text.to_string()));
                }
                rest = r;
            }
            continue;
        }
        if let Ok((r, data)) = parse_text(rest) {
            tokens.push(Token::Text(data.to_string()));
            rest = r;
            continue;
        }
        // A stray `<` that opens nothing recognizable.
        let width = rest.chars().next().map(char::len_utf8).unwrap_or(0);
        tokens.push(Token::Text(rest[..width].to_string()));
        rest = &rest[width..];
    }
    tokens
}

/// Builds the element tree from a token stream, tolerating malformed nesting.
pub struct TreeBuilder {
    doc: Document,
    current: NodeId,
}

impl TreeBuilder {
    pub fn new() -> Self {
        let doc = Document::new();
        let current = doc.root();
        Self { doc, current }
    }

    pub fn process(&mut self, token: Token) {
        match token {
            Token::StartTag { name, attributes } => {
                self.current = self.doc.append_element(self.current, name, attributes);
            }
            Token::EndTag(name) => {
                // Pop up to and including the nearest ancestor with this name,
                // implicitly closing anything improperly nested in between. A
                // stray end tag with no open match only resets to the root.
                let mut cursor = Some(self.current);
                while let Some(id) = cursor {
                    if self.doc[id].name == name {
                        self.current = self.doc[id].parent().unwrap_or_else(|| self.doc.root());
                        return;
                    }
                    cursor = self.doc[id].parent();
                }
                self.current = self.doc.root();
            }
            Token::Text(data) => self.doc.append_text(self.current, &data),
        }
    }

    pub fn finish(self) -> Document {
        self.doc
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a complete page into a [`Document`]. Total: malformed markup yields
/// a best-effort tree, never an error.
pub fn parse(input: &str) -> Document {
    let mut builder = TreeBuilder::new();
    for token in tokenize(input) {
        builder.process(token);
    }
    builder.finish()
}

// Attribute parsing below

fn parse_single_quoted(input: &str) -> IResult<&str, &str> {
    let esc = escaped(none_of("\\'"), '\\', tag("'"));
    let esc_or_empty = alt((esc, tag("")));
    delimited(tag("'"), esc_or_empty, tag("'"))(input)
}

fn parse_double_quoted(input: &str) -> IResult<&str, &str> {
    let esc = escaped(none_of("\\\""), '\\', tag("\""));
    let esc_or_empty = alt((esc, tag("")));
    delimited(tag("\""), esc_or_empty, tag("\""))(input)
}

fn parse_unquoted(input: &str) -> IResult<&str, &str> {
    is_not(" \t\r\n\"'=<>`")(input)
}

fn value_parser(input: &str) -> IResult<&str, &str> {
    alt((parse_single_quoted, parse_double_quoted, parse_unquoted))(input)
}

fn name_parser(input: &str) -> IResult<&str, &str> {
    is_not(" \t\r\n\"'>/=")(input)
}

fn single_attr_parser(input: &str) -> IResult<&str, (&str, &str)> {
    let eq = delimited(multispace0, char('='), multispace0);
    let mut key_value = separated_pair(name_parser, eq, value_parser);
    if let Ok((r, (k, v))) = key_value(input) {
        Ok((r, (k, v)))
    } else {
        let (r, res) = name_parser(input)?;
        Ok((r, (res, "")))
    }
}

fn all_attr_parser(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list0(multispace1, single_attr_parser)(input)
}

#[cfg(test)]
#[test]
fn test_tag_tokenize() {
    let tokens = tokenize(r#"<div attr1 attr2=two attr3='three' attr4="number four">"#);
    assert_eq!(
        tokens,
        vec![Token::StartTag {
            name: "div".to_string(),
            attributes: vec![
                ("attr1".to_string(), "".to_string()),
                ("attr2".to_string(), "two".to_string()),
                ("attr3".to_string(), "three".to_string()),
                ("attr4".to_string(), "number four".to_string()),
            ],
        }]
    );

    let tokens = tokenize("<IMG SRC=/a.png />");
    assert_eq!(
        tokens,
        vec![Token::StartTag {
            name: "img".to_string(),
            attributes: vec![("src".to_string(), "/a.png".to_string())],
        }]
    );
}

#[cfg(test)]
#[test]
fn test_comment_and_doctype_skipped() {
    let tokens = tokenize("<!DOCTYPE html><!-- a > comment --><p>x</p>");
    assert_eq!(
        tokens,
        vec![
            Token::StartTag {
                name: "p".to_string(),
                attributes: vec![],
            },
            Token::Text("x".to_string()),
            Token::EndTag("p".to_string()),
        ]
    );
}

#[cfg(test)]
#[test]
fn test_script_raw_text() {
    let tokens = tokenize(r#"<script type="application/ld+json">{"a": "<b>"}</script>"#);
    assert_eq!(tokens[1], Token::Text(r#"{"a": "<b>"}"#.to_string()));
    assert_eq!(tokens[2], Token::EndTag("script".to_string()));
}

#[cfg(test)]
#[test]
fn test_malformed_recovery() {
    // An unmatched end tag never panics; following content attaches at the root.
    let doc = parse("</div><p>x</p>");
    let root = doc.root();
    assert_eq!(doc[root].children().len(), 1);
    let p = doc[root].children()[0];
    assert_eq!(doc[p].name, "p");
    assert_eq!(doc[p].text, "x");
}

#[cfg(test)]
#[test]
fn test_auto_close_intermediates() {
    // </ul> closes the still-open <li> on the way out.
    let doc = parse("<ul><li>one</ul><p>after</p>");
    let root = doc.root();
    assert_eq!(doc[root].children().len(), 2);
    let names: Vec<&str> = doc[root]
        .children()
        .iter()
        .map(|&id| doc[id].name.as_str())
        .collect();
    assert_eq!(names, vec!["ul", "p"]);
}

#[cfg(test)]
#[test]
fn test_nested_same_name_stack_discipline() {
    // The inner <div> closes first; "outer" text lands on the outer one.
    let doc = parse("<div><div>inner</div>outer</div>");
    let root = doc.root();
    let outer = doc[root].children()[0];
    assert_eq!(doc[outer].text, "outer");
    let inner = doc[outer].children()[0];
    assert_eq!(doc[inner].text, "inner");
}

#[cfg(test)]
#[test]
fn test_void_tag_stays_open() {
    // No void-element special casing: <img> keeps accepting children until an
    // ancestor closes.
    let doc = parse("<p><img src=a.png>tail</p>");
    let root = doc.root();
    let p = doc[root].children()[0];
    let img = doc[p].children()[0];
    assert_eq!(doc[img].name, "img");
    assert_eq!(doc[img].text, "tail");
}

#[cfg(test)]
#[test]
fn test_duplicate_attribute_last_wins() {
    let doc = parse(r#"<meta name="first" name="second">"#);
    let meta = doc[doc.root()].children()[0];
    assert_eq!(doc[meta].attr("name"), Some("second"));
}
