//! Analysis directives (`.op`, `.ac`, `.tran`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::NetlistError;
use crate::units::{parse_value, spice_number};

/// The three analysis families a netlist can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    OperatingPoint,
    FrequencySweep,
    TimeDomain,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::OperatingPoint,
        AnalysisKind::FrequencySweep,
        AnalysisKind::TimeDomain,
    ];

    /// Directive keyword, as written in netlists and in the stat stream.
    pub fn keyword(self) -> &'static str {
        match self {
            AnalysisKind::OperatingPoint => ".op",
            AnalysisKind::FrequencySweep => ".ac",
            AnalysisKind::TimeDomain => ".tran",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for AnalysisKind {
    type Err = NetlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            ".op" => Ok(AnalysisKind::OperatingPoint),
            ".ac" => Ok(AnalysisKind::FrequencySweep),
            ".tran" => Ok(AnalysisKind::TimeDomain),
            other => Err(NetlistError::UnknownDirective(other.to_string())),
        }
    }
}

/// Largest point count an `.ac` directive keeps; larger requests are
/// clamped so resolved counts stay representable.
pub const MAX_SWEEP_POINTS: u64 = 1_000_000_000_000;

/// Point distribution of an AC sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepScale {
    Lin,
    Dec,
    Oct,
}

impl SweepScale {
    fn keyword(self) -> &'static str {
        match self {
            SweepScale::Lin => "lin",
            SweepScale::Dec => "dec",
            SweepScale::Oct => "oct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencySpan {
    pub scale: SweepScale,
    pub start: f64,
    pub stop: f64,
}

/// The directive governing a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisDirective {
    OperatingPoint,
    /// `.ac <scale> <points> <fstart> <fstop>`
    FrequencySweep { points: u64, span: FrequencySpan },
    /// `.tran <step> <stop> [<start>]`; `duration` is the stop time.
    TimeDomain {
        step: f64,
        duration: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<f64>,
    },
}

impl AnalysisDirective {
    /// Parse a directive line. The keyword is case-insensitive.
    pub fn parse(line: &str) -> Result<Self, NetlistError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let keyword = tokens
            .first()
            .ok_or_else(|| NetlistError::MalformedDirective(line.to_string()))?;
        let malformed = || NetlistError::MalformedDirective(line.trim().to_string());

        match keyword.parse::<AnalysisKind>()? {
            AnalysisKind::OperatingPoint => Ok(AnalysisDirective::OperatingPoint),
            AnalysisKind::FrequencySweep => {
                if tokens.len() < 5 {
                    return Err(malformed());
                }
                let scale = match tokens[1].to_lowercase().as_str() {
                    "lin" => SweepScale::Lin,
                    "dec" => SweepScale::Dec,
                    "oct" => SweepScale::Oct,
                    _ => return Err(malformed()),
                };
                let points = parse_value(tokens[2])
                    .filter(|p| p.is_finite() && *p >= 1.0)
                    .ok_or_else(malformed)?
                    .round()
                    .min(MAX_SWEEP_POINTS as f64) as u64;
                let start = parse_value(tokens[3]).ok_or_else(malformed)?;
                let stop = parse_value(tokens[4]).ok_or_else(malformed)?;
                if !(start > 0.0 && stop >= start && stop.is_finite()) {
                    return Err(malformed());
                }
                Ok(AnalysisDirective::FrequencySweep {
                    points,
                    span: FrequencySpan { scale, start, stop },
                })
            }
            AnalysisKind::TimeDomain => {
                if tokens.len() < 3 {
                    return Err(malformed());
                }
                let step = parse_value(tokens[1]).ok_or_else(malformed)?;
                let duration = parse_value(tokens[2]).ok_or_else(malformed)?;
                if !(step > 0.0 && duration > 0.0 && duration.is_finite()) {
                    return Err(malformed());
                }
                let start = match tokens.get(3) {
                    Some(tok) => Some(parse_value(tok).ok_or_else(malformed)?),
                    None => None,
                };
                Ok(AnalysisDirective::TimeDomain {
                    step,
                    duration,
                    start,
                })
            }
        }
    }

    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisDirective::OperatingPoint => AnalysisKind::OperatingPoint,
            AnalysisDirective::FrequencySweep { .. } => AnalysisKind::FrequencySweep,
            AnalysisDirective::TimeDomain { .. } => AnalysisKind::TimeDomain,
        }
    }

    /// Number of points the frequency axis resolves to.
    ///
    /// `fstart == fstop` is a single frequency regardless of the scale.
    /// Logarithmic scales count `points` per decade/octave plus the end point.
    pub fn frequency_points(&self) -> Option<u64> {
        let AnalysisDirective::FrequencySweep { points, span } = self else {
            return None;
        };
        if span.start == span.stop {
            return Some(1);
        }
        let count = match span.scale {
            SweepScale::Lin => *points,
            SweepScale::Dec => log_points(*points, (span.stop / span.start).log10()),
            SweepScale::Oct => log_points(*points, (span.stop / span.start).log2()),
        };
        Some(count.max(1))
    }

    /// True for `.ac` sweeps that resolve to exactly one frequency.
    pub fn is_single_frequency(&self) -> bool {
        self.frequency_points() == Some(1)
    }

    /// Samples requested by a `.tran` directive (`duration / step`).
    pub fn time_samples(&self) -> Option<f64> {
        match self {
            AnalysisDirective::TimeDomain { step, duration, .. } => Some(duration / step),
            _ => None,
        }
    }
}

fn log_points(per_unit: u64, units: f64) -> u64 {
    // tolerate log10(1000) landing a hair above 3
    let intervals = (per_unit as f64 * units - 1e-9).ceil().max(0.0);
    // float-to-int casts saturate
    (intervals as u64).saturating_add(1)
}

impl fmt::Display for AnalysisDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisDirective::OperatingPoint => f.write_str(".op"),
            AnalysisDirective::FrequencySweep { points, span } => write!(
                f,
                ".ac {} {} {} {}",
                span.scale.keyword(),
                points,
                spice_number(span.start),
                spice_number(span.stop)
            ),
            AnalysisDirective::TimeDomain {
                step,
                duration,
                start,
            } => {
                write!(f, ".tran {} {}", spice_number(*step), spice_number(*duration))?;
                if let Some(start) = start {
                    write!(f, " {}", spice_number(*start))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_op() {
        assert_eq!(
            AnalysisDirective::parse(".op").unwrap(),
            AnalysisDirective::OperatingPoint
        );
        assert_eq!(
            AnalysisDirective::parse(".OP").unwrap().kind(),
            AnalysisKind::OperatingPoint
        );
    }

    #[test]
    fn test_parse_ac() {
        let d = AnalysisDirective::parse(".ac dec 10 1 1k").unwrap();
        match d {
            AnalysisDirective::FrequencySweep { points, span } => {
                assert_eq!(points, 10);
                assert_eq!(span.scale, SweepScale::Dec);
                assert_eq!(span.start, 1.0);
                assert_eq!(span.stop, 1000.0);
            }
            other => panic!("unexpected directive {:?}", other),
        }
        // three decades at 10 points per decade, plus the end point
        assert_eq!(d.frequency_points(), Some(31));
        assert!(!d.is_single_frequency());
    }

    #[test]
    fn test_single_frequency() {
        let d = AnalysisDirective::parse(".ac lin 1 50 50").unwrap();
        assert!(d.is_single_frequency());
        let d = AnalysisDirective::parse(".ac lin 200 50 50").unwrap();
        assert!(d.is_single_frequency());
    }

    #[test]
    fn test_parse_tran() {
        let d = AnalysisDirective::parse(".tran 1m 10").unwrap();
        assert_eq!(d.kind(), AnalysisKind::TimeDomain);
        let samples = d.time_samples().unwrap();
        assert!((samples - 10_000.0).abs() < 1e-6);
        assert_eq!(d.to_string(), ".tran 0.001 10");
    }

    #[test]
    fn test_malformed_directives() {
        assert!(AnalysisDirective::parse(".ac dec 10 1").is_err());
        assert!(AnalysisDirective::parse(".ac log 10 1 10").is_err());
        assert!(AnalysisDirective::parse(".ac dec 10 100 1").is_err());
        assert!(AnalysisDirective::parse(".tran 0 10").is_err());
        assert!(AnalysisDirective::parse(".tran abc 10").is_err());
        assert!(matches!(
            AnalysisDirective::parse(".noise v(1) V1 dec 10 1 1k"),
            Err(NetlistError::UnknownDirective(_))
        ));
    }

    #[test]
    fn test_huge_point_counts_stay_multi_frequency() {
        let d = AnalysisDirective::parse(".ac dec 1e19 1 100").unwrap();
        match &d {
            AnalysisDirective::FrequencySweep { points, .. } => assert_eq!(*points, MAX_SWEEP_POINTS),
            other => panic!("unexpected directive {:?}", other),
        }
        assert!(d.frequency_points().unwrap() > MAX_SWEEP_POINTS);
        assert!(!d.is_single_frequency());

        assert_eq!(log_points(u64::MAX, 1e6), u64::MAX);
    }

    #[test]
    fn test_display_roundtrips_through_parse() {
        let d = AnalysisDirective::parse(".ac oct 5 100 3200").unwrap();
        assert_eq!(d.to_string(), ".ac oct 5 100 3200");
        assert_eq!(AnalysisDirective::parse(&d.to_string()).unwrap(), d);
    }
}
