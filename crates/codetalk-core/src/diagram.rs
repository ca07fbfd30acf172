//! Mermaid class diagrams: fenced-block extraction and heuristic synthesis
//! from backticked identifiers in free text.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

pub const FENCE_OPEN: &str = "```mermaid";
const FENCE_CLOSE: &str = "```";

pub const DIAGRAM_HEADER: &str = "classDiagram";
pub const NO_RELATIONSHIPS_COMMENT: &str = "%% No explicit relationships found";
const INDENT: &str = "    ";

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```mermaid\n(.*?)\n```").expect("valid fence regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([A-Za-z0-9_]+)`").expect("valid identifier regex"))
}

fn relationship_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)`([A-Za-z0-9_]+)`.*?(?:depends on|via)\s*`([A-Za-z0-9_]+)`")
            .expect("valid relationship regex")
    })
}

/// True when the whole message is a fenced mermaid block
pub fn is_diagram_message(text: &str) -> bool {
    text.trim().starts_with(FENCE_OPEN)
}

/// Interior of the first fenced mermaid block, or an empty string
pub fn extract_fenced(text: &str) -> String {
    fenced_block_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Wrap diagram source in a fenced mermaid block
pub fn fence(code: &str) -> String {
    format!("{}\n{}\n{}", FENCE_OPEN, code, FENCE_CLOSE)
}

/// A directed `depends on` edge between two classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub from: String,
    pub to: String,
}

/// Class diagram built from free text.
///
/// Every relationship endpoint is also in `classes`; classes are unique and
/// kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDiagram {
    classes: Vec<String>,
    relationships: Vec<Relationship>,
}

impl ClassDiagram {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    fn add_class(&mut self, name: &str) {
        if !self.classes.iter().any(|c| c == name) {
            self.classes.push(name.to_string());
        }
    }

    fn add_relationship(&mut self, from: &str, to: &str) {
        self.add_class(from);
        self.add_class(to);
        self.relationships.push(Relationship {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    /// Mermaid source text for this diagram
    pub fn to_source(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ClassDiagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", DIAGRAM_HEADER)?;
        for class in &self.classes {
            writeln!(f, "{}class {}", INDENT, class)?;
        }
        for rel in &self.relationships {
            writeln!(f, "{}{} --> {} : depends on", INDENT, rel.from, rel.to)?;
        }
        if self.relationships.is_empty() && !self.classes.is_empty() {
            writeln!(f, "{}{}", INDENT, NO_RELATIONSHIPS_COMMENT)?;
        }
        Ok(())
    }
}

/// Build a class diagram from backticked identifiers and
/// "`A` ... depends on / via `B`" phrases. Never fails.
///
/// The relationship scan is non-greedy but can still pair identifiers from
/// unrelated clauses on the same line.
pub fn synthesize(text: &str) -> ClassDiagram {
    let mut diagram = ClassDiagram::default();

    for caps in identifier_re().captures_iter(text) {
        diagram.add_class(&caps[1]);
    }

    for caps in relationship_re().captures_iter(text) {
        diagram.add_relationship(&caps[1], &caps[2]);
    }

    diagram
}

/// Diagram source for a message: its own fenced block if it is a diagram
/// message, otherwise a synthesized class diagram.
pub fn diagram_source_for(text: &str) -> String {
    if is_diagram_message(text) {
        extract_fenced(text)
    } else {
        synthesize(text).to_source()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_empty() {
        let diagram = synthesize("");
        assert!(diagram.classes().is_empty());
        assert_eq!(diagram.to_source(), "classDiagram\n");
    }

    #[test]
    fn test_synthesize_classes_without_relationships() {
        let diagram = synthesize("See `OrderService` and `OrderRepo`, plus `OrderService` again.");
        assert_eq!(diagram.classes(), ["OrderService", "OrderRepo"]);
        assert_eq!(
            diagram.to_source(),
            "classDiagram\n    class OrderService\n    class OrderRepo\n    %% No explicit relationships found\n"
        );
    }

    #[test]
    fn test_synthesize_relationships() {
        let text = "`OrderService` depends on `OrderRepo`.\n`Checkout` talks to payments via `PaymentGateway`.";
        let diagram = synthesize(text);
        assert_eq!(
            diagram.classes(),
            ["OrderService", "OrderRepo", "Checkout", "PaymentGateway"]
        );
        assert_eq!(diagram.relationships().len(), 2);
        let source = diagram.to_source();
        assert!(source.contains("    OrderService --> OrderRepo : depends on\n"));
        assert!(source.contains("    Checkout --> PaymentGateway : depends on\n"));
        assert!(!source.contains(NO_RELATIONSHIPS_COMMENT));
    }

    #[test]
    fn test_relationship_phrase_is_case_insensitive() {
        let diagram = synthesize("`A` DEPENDS ON `B`");
        assert_eq!(
            diagram.relationships(),
            [Relationship {
                from: "A".into(),
                to: "B".into()
            }]
        );
    }

    #[test]
    fn test_counts_and_endpoint_invariant() {
        let text = "`A` depends on `B`\n`C` via `A`\n`D` is standalone\n`B` depends on `C`";
        let diagram = synthesize(text);
        let source = diagram.to_source();

        let declarations = source.lines().filter(|l| l.trim_start().starts_with("class ")).count();
        let relationships = source.lines().filter(|l| l.contains(" --> ")).count();
        assert_eq!(declarations, 4);
        assert_eq!(relationships, 3);

        for rel in diagram.relationships() {
            assert!(diagram.classes().contains(&rel.from));
            assert!(diagram.classes().contains(&rel.to));
        }
    }

    #[test]
    fn test_non_word_backticks_are_not_classes() {
        let diagram = synthesize("run `cargo test` or `foo.bar` then `Baz`");
        assert_eq!(diagram.classes(), ["Baz"]);
    }

    #[test]
    fn test_extract_fenced() {
        let text = "Here you go:\n```mermaid\nclassDiagram\n    class A\n```\nthanks";
        assert_eq!(extract_fenced(text), "classDiagram\n    class A");
        assert_eq!(extract_fenced("no diagram here"), "");
    }

    #[test]
    fn test_extract_is_left_inverse_of_fence() {
        for t in ["", "classDiagram", "graph TD\n  A --> B\n", "multi\nline\n\ntext"] {
            assert_eq!(extract_fenced(&fence(t)), t);
        }
    }

    #[test]
    fn test_is_diagram_message() {
        assert!(is_diagram_message("  ```mermaid\ngraph TD\n```"));
        assert!(!is_diagram_message("text then ```mermaid\ngraph TD\n```"));
    }

    #[test]
    fn test_diagram_source_for() {
        let fenced = fence("graph TD\n  A --> B");
        assert_eq!(diagram_source_for(&fenced), "graph TD\n  A --> B");
        assert_eq!(
            diagram_source_for("`A` depends on `B`"),
            "classDiagram\n    class A\n    class B\n    A --> B : depends on\n"
        );
    }
}
