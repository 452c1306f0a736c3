//! Path expressions for addressing elements of an input document
//!
//! [`XPath`] implements the subset of XPath 1.0 used by input modifications:
//!
//! - absolute (`/fleurInput/atomSpecies`) and relative (`mtSphere`, `./lo`) paths
//! - descendant steps (`//species`, `atomGroup//relPos`)
//! - wildcard (`*`), self (`.`) and parent (`..`) steps
//! - predicates `[n]`, `[last()]`, `[@a]`, `[@a='v']`, `[@a!='v']`,
//!   `[contains(@a,'v')]` and `[not(...)]`, chained as `[..][..]`
//!
//! Results are [`NodePath`]s (child indices from the root element), always
//! sorted in document order.

use crate::error::XmlError;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use xmltree::{Element, XMLNode};

/// Location of an element: indices into `children` from the root element down
///
/// Lexicographic order of node paths is document order.
pub type NodePath = Vec<usize>;

/// Parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
    Current,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// 1-based position; negative counts from the end (`last()` is -1)
    Position(i64),
    HasAttr(String),
    AttrEq(String, String),
    AttrNe(String, String),
    Contains(String, String),
    Not(Box<Predicate>),
}

impl Predicate {
    fn test(&self, element: &Element) -> bool {
        match self {
            Self::Position(_) => true,
            Self::HasAttr(name) => element.attributes.contains_key(name),
            Self::AttrEq(name, value) => element.attributes.get(name) == Some(value),
            Self::AttrNe(name, value) => element
                .attributes
                .get(name)
                .is_some_and(|actual| actual != value),
            Self::Contains(name, value) => element
                .attributes
                .get(name)
                .is_some_and(|actual| actual.contains(value.as_str())),
            Self::Not(inner) => !inner.test(element),
        }
    }
}

impl XPath {
    /// Parse a path expression
    ///
    /// # Errors
    /// [`XmlError::InvalidPath`] on syntax errors
    pub fn parse(source: &str) -> Result<Self, XmlError> {
        source.parse()
    }

    /// Whether the path starts at the document root
    #[inline]
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// The source text of this expression
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Select elements starting at the root element
    #[must_use]
    pub fn select(&self, root: &Element) -> Vec<NodePath> {
        self.select_from(root, &[])
    }

    /// Select elements relative to `context` (absolute paths ignore it)
    #[must_use]
    pub fn select_from(&self, root: &Element, context: &[usize]) -> Vec<NodePath> {
        let mut steps = self.steps.iter();
        let mut current: Vec<NodePath> = if self.absolute {
            let Some(first) = steps.next() else {
                return Vec::new();
            };
            let mut found = filter_group(root, root_group(root, first), &first.predicates);
            if first.axis == Axis::Descendant {
                for node in descendants_or_self(root, &[]) {
                    let group = child_group(root, &node, &first.test);
                    found.extend(filter_group(root, group, &first.predicates));
                }
            }
            found
        } else {
            vec![context.to_vec()]
        };

        for step in steps {
            let mut next = Vec::new();
            for node in &current {
                next.extend(apply_step(root, node, step));
            }
            next.sort();
            next.dedup();
            current = next;
        }
        current.sort();
        current.dedup();
        current
    }
}

fn root_group(root: &Element, step: &Step) -> Vec<NodePath> {
    let matches = match &step.test {
        NodeTest::Name(name) => name_matches(root, name),
        NodeTest::Any => true,
        NodeTest::Current | NodeTest::Parent => false,
    };
    if matches {
        vec![Vec::new()]
    } else {
        Vec::new()
    }
}

fn apply_step(root: &Element, node: &[usize], step: &Step) -> Vec<NodePath> {
    match step.test {
        NodeTest::Current => filter_group(root, vec![node.to_vec()], &step.predicates),
        NodeTest::Parent => match node.split_last() {
            Some((_, parent)) => filter_group(root, vec![parent.to_vec()], &step.predicates),
            None => Vec::new(),
        },
        _ => {
            let parents = match step.axis {
                Axis::Child => vec![node.to_vec()],
                Axis::Descendant => descendants_or_self(root, node),
            };
            parents
                .iter()
                .flat_map(|parent| {
                    let group = child_group(root, parent, &step.test);
                    filter_group(root, group, &step.predicates)
                })
                .collect()
        }
    }
}

fn child_group(root: &Element, parent: &[usize], test: &NodeTest) -> Vec<NodePath> {
    let Some(element) = element_at(root, parent) else {
        return Vec::new();
    };
    element
        .children
        .iter()
        .enumerate()
        .filter_map(|(index, child)| match child {
            XMLNode::Element(e) => {
                let matches = match test {
                    NodeTest::Name(name) => name_matches(e, name),
                    _ => true,
                };
                matches.then(|| {
                    let mut path = parent.to_vec();
                    path.push(index);
                    path
                })
            }
            _ => None,
        })
        .collect()
}

fn filter_group(root: &Element, group: Vec<NodePath>, predicates: &[Predicate]) -> Vec<NodePath> {
    let mut nodes = group;
    for predicate in predicates {
        nodes = match predicate {
            Predicate::Position(position) => {
                let len = nodes.len() as i64;
                let index = if *position > 0 { position - 1 } else { len + position };
                if (0..len).contains(&index) {
                    vec![nodes.swap_remove(index as usize)]
                } else {
                    Vec::new()
                }
            }
            other => nodes
                .into_iter()
                .filter(|path| element_at(root, path).is_some_and(|e| other.test(e)))
                .collect(),
        };
    }
    nodes
}

fn name_matches(element: &Element, name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => element.name == local && element.prefix.as_deref() == Some(prefix),
        None => element.name == name,
    }
}

/// Element at `path`, if the path still points at an element
#[must_use]
pub fn element_at<'a>(root: &'a Element, path: &[usize]) -> Option<&'a Element> {
    let mut current = root;
    for &index in path {
        current = match current.children.get(index)? {
            XMLNode::Element(e) => e,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable element at `path`
#[must_use]
pub fn element_at_mut<'a>(root: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    let mut current = root;
    for &index in path {
        current = match current.children.get_mut(index)? {
            XMLNode::Element(e) => e,
            _ => return None,
        };
    }
    Some(current)
}

/// Tag-name path of the element at `path`, e.g. `/fleurInput/cell/bzIntegration`
#[must_use]
pub fn name_path(root: &Element, path: &[usize]) -> String {
    let mut names = vec![root.name.as_str()];
    let mut current = root;
    for &index in path {
        match current.children.get(index) {
            Some(XMLNode::Element(e)) => {
                names.push(e.name.as_str());
                current = e;
            }
            _ => break,
        }
    }
    format!("/{}", names.join("/"))
}

/// All element paths below `path`, excluding `path` itself, in document order
#[must_use]
pub fn descendants(root: &Element, path: &[usize]) -> Vec<NodePath> {
    let mut out = Vec::new();
    if let Some(element) = element_at(root, path) {
        collect_descendants(element, path.to_vec(), &mut out);
    }
    out
}

fn descendants_or_self(root: &Element, path: &[usize]) -> Vec<NodePath> {
    let mut out = vec![path.to_vec()];
    out.extend(descendants(root, path));
    out
}

fn collect_descendants(element: &Element, prefix: NodePath, out: &mut Vec<NodePath>) {
    for (index, child) in element.children.iter().enumerate() {
        if let XMLNode::Element(e) = child {
            let mut path = prefix.clone();
            path.push(index);
            out.push(path.clone());
            collect_descendants(e, path, out);
        }
    }
}

impl Display for XPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for XPath {
    type Err = XmlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim();
        let (absolute, raw_steps) = split_steps(source)?;
        let steps = raw_steps
            .into_iter()
            .map(|(axis, text)| parse_step(axis, &text).map_err(|reason| XmlError::invalid_path(source, reason)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }
}

fn split_steps(source: &str) -> Result<(bool, Vec<(Axis, String)>), XmlError> {
    if source.is_empty() {
        return Err(XmlError::invalid_path(source, "empty path"));
    }
    let chars: Vec<char> = source.chars().collect();
    let (absolute, mut axis, mut i) = if source.starts_with("//") {
        (true, Axis::Descendant, 2)
    } else if source.starts_with('/') {
        (true, Axis::Child, 1)
    } else {
        (false, Axis::Child, 0)
    };

    let mut steps = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
        } else {
            match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' => {
                    depth += 1;
                    current.push(c);
                }
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| XmlError::invalid_path(source, "unbalanced ']'"))?;
                    current.push(c);
                }
                '/' if depth == 0 => {
                    if current.is_empty() {
                        return Err(XmlError::invalid_path(source, "empty step"));
                    }
                    steps.push((axis, std::mem::take(&mut current)));
                    if chars.get(i + 1) == Some(&'/') {
                        axis = Axis::Descendant;
                        i += 1;
                    } else {
                        axis = Axis::Child;
                    }
                }
                _ => current.push(c),
            }
        }
        i += 1;
    }
    if quote.is_some() || depth != 0 {
        return Err(XmlError::invalid_path(source, "unbalanced quotes or brackets"));
    }
    if current.is_empty() {
        return Err(XmlError::invalid_path(source, "path ends with '/'"));
    }
    steps.push((axis, current));
    Ok((absolute, steps))
}

fn parse_step(axis: Axis, text: &str) -> Result<Step, String> {
    let (name, rest) = match text.find('[') {
        Some(pos) => (text[..pos].trim(), &text[pos..]),
        None => (text.trim(), ""),
    };
    let test = match name {
        "" => return Err(format!("step '{text}' has no node test")),
        "*" => NodeTest::Any,
        "." => NodeTest::Current,
        ".." => NodeTest::Parent,
        other if other.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')) => {
            NodeTest::Name(other.to_string())
        }
        other => return Err(format!("invalid node test '{other}'")),
    };
    let predicates = split_predicates(rest)?
        .iter()
        .map(|p| parse_predicate(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Step {
        axis,
        test,
        predicates,
    })
}

fn split_predicates(text: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '[' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            ']' => {
                depth -= 1;
                if depth == 0 {
                    out.push(std::mem::take(&mut current));
                } else {
                    current.push(c);
                }
            }
            c if depth == 0 && !c.is_whitespace() => {
                return Err(format!("unexpected '{c}' between predicates"));
            }
            _ => current.push(c),
        }
    }
    Ok(out)
}

fn parse_predicate(text: &str) -> Result<Predicate, String> {
    let t = text.trim();
    if t == "last()" {
        return Ok(Predicate::Position(-1));
    }
    if let Ok(position) = t.parse::<i64>() {
        if position == 0 {
            return Err("positions are 1-based".to_string());
        }
        return Ok(Predicate::Position(position));
    }
    if let Some(inner) = strip_call(t, "not") {
        return match parse_predicate(inner)? {
            Predicate::Position(_) => Err("not() cannot wrap a position".to_string()),
            other => Ok(Predicate::Not(Box::new(other))),
        };
    }
    if let Some(inner) = strip_call(t, "contains") {
        let (left, right) = inner
            .split_once(',')
            .ok_or_else(|| format!("contains() needs two arguments: '{t}'"))?;
        let attribute = left
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| format!("contains() expects an attribute: '{t}'"))?;
        return Ok(Predicate::Contains(
            attribute.trim().to_string(),
            parse_literal(right)?,
        ));
    }
    if let Some(rest) = t.strip_prefix('@') {
        let operator_zone = rest.find(['\'', '"']).unwrap_or(rest.len());
        let head = &rest[..operator_zone];
        if let Some(pos) = head.find("!=") {
            return Ok(Predicate::AttrNe(
                rest[..pos].trim().to_string(),
                parse_literal(&rest[pos + 2..])?,
            ));
        }
        if let Some(pos) = head.find('=') {
            return Ok(Predicate::AttrEq(
                rest[..pos].trim().to_string(),
                parse_literal(&rest[pos + 1..])?,
            ));
        }
        return Ok(Predicate::HasAttr(rest.trim().to_string()));
    }
    Err(format!("unsupported predicate '{t}'"))
}

fn strip_call<'a>(text: &'a str, function: &str) -> Option<&'a str> {
    text.strip_prefix(function)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
}

/// Quote a value for use as a string literal in a predicate
///
/// Single quotes are used unless the value contains one. A value holding both
/// quote characters has no literal form.
///
/// # Errors
/// [`XmlError::InvalidPath`] if `value` contains both `'` and `"`
pub fn quote_literal(value: &str) -> Result<String, XmlError> {
    match (value.contains('\''), value.contains('"')) {
        (false, _) => Ok(format!("'{value}'")),
        (true, false) => Ok(format!("\"{value}\"")),
        (true, true) => Err(XmlError::invalid_path(
            value,
            "value contains both quote characters and cannot be a literal",
        )),
    }
}

fn parse_literal(text: &str) -> Result<String, String> {
    let t = text.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = t.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return Ok(inner.to_string());
        }
    }
    Err(format!("expected a quoted literal, got '{t}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_xml;

    const DECK: &str = r#"<fleurInput>
        <atomSpecies>
            <species name="Fe-1" element="Fe"><lo l="0"/><lo l="1"/></species>
            <species name="Pt-1" element="Pt"/>
            <species name="Fe-2" element="Fe"/>
        </atomSpecies>
        <atomGroups>
            <atomGroup species="Fe-1"><relPos label="1">0 0 0</relPos></atomGroup>
            <atomGroup species="Pt-1"><relPos label="2">0.5 0.5 0.5</relPos></atomGroup>
        </atomGroups>
    </fleurInput>"#;

    fn deck() -> Element {
        parse_xml("inp.xml", DECK.as_bytes()).unwrap()
    }

    fn names(root: &Element, xpath: &str) -> Vec<String> {
        XPath::parse(xpath)
            .unwrap()
            .select(root)
            .iter()
            .map(|p| {
                let e = element_at(root, p).unwrap();
                e.attributes
                    .get("name")
                    .or_else(|| e.attributes.get("species"))
                    .cloned()
                    .unwrap_or_else(|| e.name.clone())
            })
            .collect()
    }

    #[test]
    fn absolute_child_path() {
        let root = deck();
        assert_eq!(
            names(&root, "/fleurInput/atomSpecies/species"),
            vec!["Fe-1", "Pt-1", "Fe-2"]
        );
    }

    #[test]
    fn wrong_root_selects_nothing() {
        let root = deck();
        assert!(names(&root, "/inputGen/atomSpecies").is_empty());
    }

    #[test]
    fn descendant_and_attribute_predicates() {
        let root = deck();
        assert_eq!(names(&root, "//species[@element='Fe']"), vec!["Fe-1", "Fe-2"]);
        assert_eq!(names(&root, "//species[@name!='Fe-1']"), vec!["Pt-1", "Fe-2"]);
        assert_eq!(names(&root, "//species[contains(@name,'Fe')]"), vec!["Fe-1", "Fe-2"]);
        assert_eq!(
            names(&root, "//species[not(contains(@name,'Fe'))]"),
            vec!["Pt-1"]
        );
    }

    #[test]
    fn position_predicates_apply_per_parent() {
        let root = deck();
        assert_eq!(names(&root, "/fleurInput/atomSpecies/species[2]"), vec!["Pt-1"]);
        assert_eq!(names(&root, "/fleurInput/atomSpecies/species[last()]"), vec!["Fe-2"]);
        assert_eq!(names(&root, "//species[@element='Fe'][2]"), vec!["Fe-2"]);
        assert_eq!(names(&root, "//lo[1]"), vec!["lo"]);
    }

    #[test]
    fn relative_paths_and_parent_steps() {
        let root = deck();
        let species = XPath::parse("//species[@name='Fe-1']").unwrap().select(&root);
        let los = XPath::parse("lo").unwrap().select_from(&root, &species[0]);
        assert_eq!(los.len(), 2);

        let label = XPath::parse("//relPos[@label='2']/..").unwrap().select(&root);
        assert_eq!(element_at(&root, &label[0]).unwrap().attributes["species"], "Pt-1");
    }

    #[test]
    fn results_are_in_document_order() {
        let root = deck();
        let all = XPath::parse("//*").unwrap().select(&root);
        assert_eq!(all.len(), 12);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
        assert_eq!(all[0], Vec::<usize>::new());
    }

    #[test]
    fn name_path_reports_tags() {
        let root = deck();
        let paths = XPath::parse("//relPos").unwrap().select(&root);
        assert_eq!(
            name_path(&root, &paths[0]),
            "/fleurInput/atomGroups/atomGroup/relPos"
        );
    }

    #[test]
    fn quoted_literals_match_names_with_quotes() {
        let root = parse_xml(
            "inp.xml",
            br#"<fleurInput><species name="O'x"/><species name="Fe-1"/></fleurInput>"#,
        )
        .unwrap();
        let xpath = format!("//species[@name={}]", quote_literal("O'x").unwrap());
        assert_eq!(names(&root, &xpath), vec!["O'x"]);
        let xpath = format!("//species[@name={}]", quote_literal("Fe-1").unwrap());
        assert_eq!(names(&root, &xpath), vec!["Fe-1"]);
        assert!(matches!(quote_literal(r#"a'b"c"#), Err(XmlError::InvalidPath { .. })));
    }

    #[test]
    fn syntax_errors_are_reported() {
        for bad in ["", "/", "a//", "a[@b='c'", "a[0]", "a[foo]", "a]"] {
            assert!(
                matches!(XPath::parse(bad), Err(XmlError::InvalidPath { .. })),
                "{bad} should not parse"
            );
        }
    }
}
