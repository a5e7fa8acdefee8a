//! Text rendering of solved `.op` and single-frequency `.ac` networks.

use num_complex::Complex64;

use crate::netlist::{is_ground, AnalysisKind, ElementKind};
use crate::session::Preferences;
use crate::solver::{BranchQuantity, SolvedNetwork};

pub const SIGN_CONVENTION_NOTICE: &str =
    "Please remember that all components are analyzed with *passive sign convention*.\n\
     Here you have *the circuit solution*.\n\n";

/// How complex quantities are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notation {
    /// `.op`: real part only
    Real,
    Cartesian,
    Polar,
}

pub struct ResultRenderer;

impl ResultRenderer {
    /// Full text response: sign-convention notice, the optional node block,
    /// then the branch block.
    ///
    /// `kind` is the analysis that was requested, not whatever the solver
    /// echoes back. Polar notation is never used for `.op`, whatever the
    /// preference says.
    pub fn render(kind: AnalysisKind, solved: &SolvedNetwork, prefs: &Preferences) -> String {
        let notation = match kind {
            AnalysisKind::OperatingPoint => Notation::Real,
            _ if prefs.polar => Notation::Polar,
            _ => Notation::Cartesian,
        };

        let mut out = String::from(SIGN_CONVENTION_NOTICE);
        if prefs.nodal_potentials {
            out.push_str(&Self::node_block(solved, notation));
        }
        out.push_str(&Self::branch_block(&solved.branches, notation));
        out
    }

    fn node_block(solved: &SolvedNetwork, notation: Notation) -> String {
        let mut block = String::from("*node potentials*\n`");
        for np in solved.node_potentials.iter().filter(|np| !is_ground(&np.node)) {
            block.push_str(&format!(
                "v({}) = {}\n",
                np.node,
                format_quantity(np.value, "V", notation)
            ));
        }
        block.push_str("`\n\n");
        block
    }

    fn branch_block(branches: &[BranchQuantity], notation: Notation) -> String {
        let mut sorted: Vec<&BranchQuantity> = branches.iter().collect();
        // stable: keeps netlist order inside each component class
        sorted.sort_by_key(|b| b.kind);

        let (power_label, power_unit) = match notation {
            Notation::Real => ("p", "W"),
            _ => ("S", "VA"),
        };

        let mut block = String::from("*branch quantities*\n`");
        let mut previous: Option<ElementKind> = None;
        for b in sorted {
            if previous.is_some_and(|k| k != b.kind) {
                block.push('\n');
            }
            previous = Some(b.kind);
            block.push_str(&format!(
                "{:<6} v = {}   i = {}   {} = {}\n",
                b.name,
                format_quantity(b.voltage, "V", notation),
                format_quantity(b.current, "A", notation),
                power_label,
                format_quantity(b.power(), power_unit, notation),
            ));
        }
        block.push('`');
        block
    }
}

fn format_quantity(value: Complex64, unit: &str, notation: Notation) -> String {
    match notation {
        Notation::Real => format!("{:10.4} {}", value.re, unit),
        Notation::Cartesian => {
            let sign = if value.im < 0.0 { '-' } else { '+' };
            format!("{:10.4} {} j{:.4} {}", value.re, sign, value.im.abs(), unit)
        }
        Notation::Polar => {
            let (mag, phase) = value.to_polar();
            format!("{:10.4} {} < {:10.4}°", mag, unit, phase.to_degrees())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{AnalysisDirective, FrequencySpan, SweepScale};
    use crate::solver::NodePotential;

    fn branch(name: &str, kind: ElementKind, v: Complex64, i: Complex64) -> BranchQuantity {
        BranchQuantity {
            name: name.into(),
            kind,
            voltage: v,
            current: i,
        }
    }

    fn divider() -> SolvedNetwork {
        SolvedNetwork {
            directive: AnalysisDirective::OperatingPoint,
            node_count: 2,
            node_potentials: vec![
                NodePotential {
                    node: "1".into(),
                    value: Complex64::new(10.0, 0.0),
                },
                NodePotential {
                    node: "2".into(),
                    value: Complex64::new(5.0, 0.0),
                },
            ],
            branches: vec![
                branch(
                    "V1",
                    ElementKind::VoltageSource,
                    Complex64::new(10.0, 0.0),
                    Complex64::new(-0.005, 0.0),
                ),
                branch(
                    "R1",
                    ElementKind::Resistor,
                    Complex64::new(5.0, 0.0),
                    Complex64::new(0.005, 0.0),
                ),
                branch(
                    "R2",
                    ElementKind::Resistor,
                    Complex64::new(5.0, 0.0),
                    Complex64::new(0.005, 0.0),
                ),
            ],
            traces: vec![],
        }
    }

    #[test]
    fn test_op_branch_block_grouped() {
        let text = ResultRenderer::render(AnalysisKind::OperatingPoint, &divider(), &Preferences::default());
        assert!(text.starts_with(SIGN_CONVENTION_NOTICE));
        assert_eq!(text.matches("passive sign convention").count(), 1);
        assert!(!text.contains("node potentials"));

        let r1 = text.find("R1").unwrap();
        let r2 = text.find("R2").unwrap();
        let v1 = text.find("V1").unwrap();
        assert!(r1 < r2 && r2 < v1);
        assert!(text.contains("p =     0.0250 W"));
        assert!(text.contains("p =    -0.0500 W"));
    }

    #[test]
    fn test_op_forces_cartesian_real() {
        let prefs = Preferences {
            nodal_potentials: true,
            polar: true,
            decibel: false,
        };
        let text = ResultRenderer::render(AnalysisKind::OperatingPoint, &divider(), &prefs);
        assert!(text.contains("*node potentials*\n`v(1) =    10.0000 V\nv(2) =     5.0000 V\n`\n\n"));
        assert!(!text.contains('°'));
    }

    #[test]
    fn test_single_frequency_polar_node_potentials() {
        let mut solved = divider();
        solved.directive = AnalysisDirective::FrequencySweep {
            points: 1,
            span: FrequencySpan {
                scale: SweepScale::Lin,
                start: 50.0,
                stop: 50.0,
            },
        };
        solved.node_potentials[1].value = Complex64::new(0.0, 5.0);

        let prefs = Preferences {
            nodal_potentials: true,
            polar: true,
            decibel: false,
        };
        let text = ResultRenderer::render(AnalysisKind::FrequencySweep, &solved, &prefs);
        assert!(text.contains("v(2) =     5.0000 V <    90.0000°"));
        assert!(text.contains("S = "));

        let prefs = Preferences {
            polar: false,
            ..prefs
        };
        let text = ResultRenderer::render(AnalysisKind::FrequencySweep, &solved, &prefs);
        assert!(text.contains("v(2) =     0.0000 + j5.0000 V"));
    }

    #[test]
    fn test_notation_follows_requested_kind() {
        // solver reports an .ac run for what was submitted as .op
        let mut solved = divider();
        solved.directive = AnalysisDirective::FrequencySweep {
            points: 1,
            span: FrequencySpan {
                scale: SweepScale::Lin,
                start: 50.0,
                stop: 50.0,
            },
        };
        let prefs = Preferences {
            nodal_potentials: true,
            polar: true,
            decibel: false,
        };
        let text = ResultRenderer::render(AnalysisKind::OperatingPoint, &solved, &prefs);
        assert!(!text.contains('°'));
        assert!(text.contains("p = "));

        solved.directive = AnalysisDirective::OperatingPoint;
        let text = ResultRenderer::render(AnalysisKind::FrequencySweep, &solved, &prefs);
        assert!(text.contains('°'));
    }

    #[test]
    fn test_node_block_precedes_branches() {
        let prefs = Preferences {
            nodal_potentials: true,
            ..Preferences::default()
        };
        let text = ResultRenderer::render(AnalysisKind::OperatingPoint, &divider(), &prefs);
        assert!(text.find("*node potentials*").unwrap() < text.find("*branch quantities*").unwrap());
    }
}
