//! Netlist model
//!
//! A submission is a SPICE-flavoured text: one element per line
//! (`R1 1 0 10k`), optional `*` comments, control lines such as `.tf` or
//! `.plot`, exactly one governing analysis directive and an optional `.end`.
//! This module only understands topology and directives; numeric solving
//! happens behind the [`crate::solver::Solver`] seam.

pub mod directive;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::parse_value;

pub use directive::{AnalysisDirective, AnalysisKind, FrequencySpan, SweepScale};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetlistError {
    #[error("netlist is empty")]
    Empty,
    #[error("no analysis directive (.op, .ac or .tran) found")]
    MissingDirective,
    #[error("unknown directive: {0}")]
    UnknownDirective(String),
    #[error("malformed directive: {0}")]
    MalformedDirective(String),
    #[error("line {line}: malformed element {name}")]
    MalformedElement { line: usize, name: String },
    #[error("line {line}: unsupported element {name}")]
    UnsupportedElement { line: usize, name: String },
    #[error("line {line}: duplicate element name {name}")]
    DuplicateElement { line: usize, name: String },
}

/// Component classes, in the order branch tables list them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Resistor,
    Inductor,
    Capacitor,
    VoltageSource,
    CurrentSource,
    /// `E`: voltage-controlled voltage source
    Vcvs,
    /// `F`: current-controlled current source
    Cccs,
    /// `G`: voltage-controlled current source
    Vccs,
    /// `H`: current-controlled voltage source
    Ccvs,
}

impl ElementKind {
    pub fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'R' => Some(ElementKind::Resistor),
            'L' => Some(ElementKind::Inductor),
            'C' => Some(ElementKind::Capacitor),
            'V' => Some(ElementKind::VoltageSource),
            'I' => Some(ElementKind::CurrentSource),
            'E' => Some(ElementKind::Vcvs),
            'F' => Some(ElementKind::Cccs),
            'G' => Some(ElementKind::Vccs),
            'H' => Some(ElementKind::Ccvs),
            _ => None,
        }
    }

    /// Number of node tokens following the element name.
    fn node_arity(self) -> usize {
        match self {
            ElementKind::Vcvs | ElementKind::Vccs => 4,
            _ => 2,
        }
    }

    /// Minimum number of tokens after the nodes.
    fn min_params(self) -> usize {
        match self {
            // controlling source name + gain
            ElementKind::Cccs | ElementKind::Ccvs => 2,
            _ => 1,
        }
    }

    fn is_passive(self) -> bool {
        matches!(
            self,
            ElementKind::Resistor | ElementKind::Inductor | ElementKind::Capacitor
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub kind: ElementKind,
    pub nodes: Vec<String>,
    pub params: Vec<String>,
}

/// A parsed submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Netlist {
    pub title: Option<String>,
    pub elements: Vec<Element>,
    /// Control lines other than the governing directive, kept verbatim.
    pub controls: Vec<String>,
    pub directive: AnalysisDirective,
    /// The directive line exactly as the user wrote it.
    pub directive_source: String,
}

pub fn is_ground(node: &str) -> bool {
    node == "0" || node.eq_ignore_ascii_case("gnd")
}

impl Netlist {
    /// Parse a canonical submission (line endings already normalized).
    pub fn parse(text: &str) -> Result<Self, NetlistError> {
        let mut title = None;
        let mut elements: Vec<Element> = Vec::new();
        let mut controls = Vec::new();
        let mut directive: Option<(AnalysisDirective, String)> = None;
        let mut seen = BTreeSet::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('*') {
                if title.is_none() && elements.is_empty() {
                    let comment = comment.trim();
                    if !comment.is_empty() {
                        title = Some(comment.to_string());
                    }
                }
                continue;
            }

            if line.starts_with('.') {
                let keyword = line
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_lowercase();
                if keyword == ".end" {
                    break;
                }
                if keyword.parse::<AnalysisKind>().is_ok() {
                    // the first analysis line governs; later ones are ignored
                    if directive.is_none() {
                        directive = Some((AnalysisDirective::parse(line)?, line.to_string()));
                    }
                } else {
                    controls.push(line.to_string());
                }
                continue;
            }

            let element = Self::parse_element(line, line_no)?;
            if !seen.insert(element.name.to_uppercase()) {
                return Err(NetlistError::DuplicateElement {
                    line: line_no,
                    name: element.name,
                });
            }
            elements.push(element);
        }

        if elements.is_empty() && directive.is_none() {
            return Err(NetlistError::Empty);
        }
        let (directive, directive_source) = directive.ok_or(NetlistError::MissingDirective)?;

        Ok(Netlist {
            title,
            elements,
            controls,
            directive,
            directive_source,
        })
    }

    fn parse_element(line: &str, line_no: usize) -> Result<Element, NetlistError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let name = tokens[0].to_string();
        let kind = name
            .chars()
            .next()
            .and_then(ElementKind::from_prefix)
            .ok_or_else(|| NetlistError::UnsupportedElement {
                line: line_no,
                name: name.clone(),
            })?;

        let arity = kind.node_arity();
        if tokens.len() < 1 + arity + kind.min_params() {
            return Err(NetlistError::MalformedElement {
                line: line_no,
                name,
            });
        }

        let nodes: Vec<String> = tokens[1..=arity].iter().map(|s| s.to_string()).collect();
        let params: Vec<String> = tokens[1 + arity..].iter().map(|s| s.to_string()).collect();

        if kind.is_passive() && parse_value(&params[0]).is_none() {
            return Err(NetlistError::MalformedElement {
                line: line_no,
                name,
            });
        }

        Ok(Element {
            name,
            kind,
            nodes,
            params,
        })
    }

    /// Distinct non-reference node names, sorted.
    pub fn node_names(&self) -> BTreeSet<&str> {
        self.elements
            .iter()
            .flat_map(|e| e.nodes.iter())
            .map(String::as_str)
            .filter(|n| !is_ground(n))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.node_names().len()
    }

    /// Number of frequency-response outputs: one per `.tf` output/input pair,
    /// at least one.
    pub fn output_count(&self) -> usize {
        let pairs: usize = self
            .controls
            .iter()
            .filter(|c| {
                c.split_whitespace()
                    .next()
                    .is_some_and(|k| k.eq_ignore_ascii_case(".tf"))
            })
            .map(|c| c.split_whitespace().skip(1).count() / 2)
            .sum();
        pairs.max(1)
    }

    /// Copy of this netlist governed by another directive.
    pub fn with_directive(&self, directive: AnalysisDirective) -> Netlist {
        Netlist {
            directive_source: directive.to_string(),
            directive,
            ..self.clone()
        }
    }

    /// Canonical SPICE text, with the (possibly rewritten) directive.
    pub fn to_spice(&self) -> String {
        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(&format!("* {}\n", title));
        }
        for e in &self.elements {
            out.push_str(&e.name);
            for tok in e.nodes.iter().chain(e.params.iter()) {
                out.push(' ');
                out.push_str(tok);
            }
            out.push('\n');
        }
        for c in &self.controls {
            out.push_str(c);
            out.push('\n');
        }
        out.push_str(&self.directive_source);
        out.push_str("\n.end\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDER: &str = "* voltage divider\nV1 1 0 10\nR1 1 2 1k\nR2 2 0 1k\n.op\n.end\n";

    #[test]
    fn test_parse_divider() {
        let net = Netlist::parse(DIVIDER).unwrap();
        assert_eq!(net.title.as_deref(), Some("voltage divider"));
        assert_eq!(net.elements.len(), 3);
        assert_eq!(net.node_count(), 2);
        assert_eq!(net.directive, AnalysisDirective::OperatingPoint);
        assert_eq!(net.elements[0].kind, ElementKind::VoltageSource);
    }

    #[test]
    fn test_missing_directive() {
        let err = Netlist::parse("V1 1 0 10\nR1 1 0 1k\n").unwrap_err();
        assert_eq!(err, NetlistError::MissingDirective);
    }

    #[test]
    fn test_empty() {
        assert_eq!(Netlist::parse("\n* nothing\n").unwrap_err(), NetlistError::Empty);
    }

    #[test]
    fn test_first_directive_governs() {
        let net = Netlist::parse("R1 1 0 1\nV1 1 0 1\n.tran 1m 1\n.op\n").unwrap();
        assert_eq!(net.directive.kind(), AnalysisKind::TimeDomain);
        assert_eq!(net.directive_source, ".tran 1m 1");
    }

    #[test]
    fn test_malformed_element() {
        let err = Netlist::parse("R1 1 0\n.op\n").unwrap_err();
        assert!(matches!(err, NetlistError::MalformedElement { line: 1, .. }));

        let err = Netlist::parse("R1 1 0 ten\n.op\n").unwrap_err();
        assert!(matches!(err, NetlistError::MalformedElement { .. }));

        let err = Netlist::parse("Q1 c b e model\n.op\n").unwrap_err();
        assert!(matches!(err, NetlistError::UnsupportedElement { .. }));
    }

    #[test]
    fn test_ground_aliases_and_controlled_sources() {
        let net = Netlist::parse(
            "V1 in GND 1\nR1 in out 1k\nE1 x 0 out 0 10\nR2 x 0 1k\nH1 y 0 V1 100\nR3 y 0 1\n.op\n",
        )
        .unwrap();
        let names: Vec<&str> = net.node_names().into_iter().collect();
        assert_eq!(names, vec!["in", "out", "x", "y"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Netlist::parse("R1 1 0 1\nr1 1 0 2\n.op\n").unwrap_err();
        assert!(matches!(err, NetlistError::DuplicateElement { line: 2, .. }));
    }

    #[test]
    fn test_output_count_from_tf_pairs() {
        let net = Netlist::parse("V1 1 0 1\nR1 1 2 1k\nC1 2 0 1u\n.ac dec 10 1 1k\n").unwrap();
        assert_eq!(net.output_count(), 1);

        let net = Netlist::parse(
            "V1 1 0 1\nR1 1 2 1k\nC1 2 0 1u\n.tf v(2) V1 i(R1) V1\n.ac dec 10 1 1k\n",
        )
        .unwrap();
        assert_eq!(net.output_count(), 2);
    }

    #[test]
    fn test_to_spice_uses_rewritten_directive() {
        let net = Netlist::parse("V1 1 0 1\nR1 1 0 1\n.tran 1u 1\n").unwrap();
        let rewritten = net.with_directive(AnalysisDirective::TimeDomain {
            step: 1.0 / 1999.0,
            duration: 1.0,
            start: None,
        });
        let text = rewritten.to_spice();
        assert!(text.contains(".tran 5.003e-4 1\n"));
        assert!(text.ends_with(".end\n"));
    }
}
