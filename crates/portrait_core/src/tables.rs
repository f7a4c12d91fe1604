//! Reader for the polynomial tables produced by the symbolic package.
//!
//! The stream is whitespace separated and line oriented only for error
//! reporting; `#` starts a comment. A study lists its vector fields (per-chart
//! P/Q tables, GCF tables, singularities with separatrix series), its separating
//! curves and the region sign vectors. Everything is validated before any
//! domain object leaves this module.

use crate::charts::ChartId;
use crate::error::StudyError;
use crate::polynomial::{Polynomial, Term};
use crate::regions::{RegionResolver, Sign};
use crate::study::{
    ChartPolynomials, OrbitType, SeparatingCurve, SeparatrixSeries, SeriesNotation, Singularity,
    SingularityKind, Stability, VectorFieldStudy,
};

/// A fully validated study.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTables {
    pub fields: Vec<VectorFieldStudy>,
    pub curves: Vec<SeparatingCurve>,
    pub regions: RegionResolver,
}

struct Tokens<'a> {
    tokens: Vec<(usize, &'a str)>,
    pos: usize,
    last_line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        let mut tokens = Vec::new();
        let mut last_line = 1;
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("");
            last_line = index + 1;
            tokens.extend(line.split_whitespace().map(|token| (index + 1, token)));
        }
        Self {
            tokens,
            pos: 0,
            last_line,
        }
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(self.last_line, |(line, _)| *line)
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|(_, token)| *token)
    }

    fn next(&mut self, what: &str) -> Result<(usize, &'a str), StudyError> {
        let token = self.tokens.get(self.pos).copied().ok_or_else(|| {
            StudyError::malformed(self.last_line, format!("unexpected end of data, expected {what}"))
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn keyword(&mut self, expected: &str) -> Result<(), StudyError> {
        let (line, token) = self.next(expected)?;
        if token != expected {
            return Err(StudyError::malformed(
                line,
                format!("expected `{expected}`, found `{token}`"),
            ));
        }
        Ok(())
    }

    fn integer(&mut self, what: &str) -> Result<i64, StudyError> {
        let (line, token) = self.next(what)?;
        token
            .parse::<i64>()
            .map_err(|_| StudyError::malformed(line, format!("expected integer {what}, found `{token}`")))
    }

    fn count(&mut self, what: &str) -> Result<usize, StudyError> {
        let line = self.line();
        let value = self.integer(what)?;
        usize::try_from(value)
            .map_err(|_| StudyError::malformed(line, format!("{what} must be non-negative, found {value}")))
    }

    fn number(&mut self, what: &str) -> Result<f64, StudyError> {
        let (line, token) = self.next(what)?;
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(StudyError::malformed(
                line,
                format!("expected finite {what}, found `{token}`"),
            )),
        }
    }

    fn choice<T: Copy>(&mut self, what: &str, options: &[(&str, T)]) -> Result<T, StudyError> {
        let (line, token) = self.next(what)?;
        options
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, value)| *value)
            .ok_or_else(|| StudyError::malformed(line, format!("unknown {what} `{token}`")))
    }

    fn chart(&mut self) -> Result<ChartId, StudyError> {
        let (line, token) = self.next("chart")?;
        ChartId::from_name(token)
            .ok_or_else(|| StudyError::malformed(line, format!("unknown chart `{token}`")))
    }

    fn terms<const N: usize>(&mut self) -> Result<Polynomial<N>, StudyError> {
        let count = self.count("term count")?;
        let mut terms = Vec::new();
        for _ in 0..count {
            let mut exponents = [0i64; N];
            for e in exponents.iter_mut() {
                *e = self.integer("exponent")?;
            }
            let coeff = self.number("coefficient")?;
            terms.push(Term::new(coeff, exponents)?);
        }
        Ok(Polynomial::new(terms))
    }

    /// Reads one polynomial into the slot of its chart.
    fn chart_terms(&mut self, chart: ChartId, target: &mut ChartPolynomials) -> Result<(), StudyError> {
        match target.planar_mut(chart) {
            Some(slot) => *slot = self.terms::<2>()?,
            None => target.cylinder = self.terms::<3>()?,
        }
        Ok(())
    }

    fn signs(&mut self) -> Result<Vec<Sign>, StudyError> {
        let mut signs = Vec::new();
        while let Some(token) = self.peek() {
            let Ok(entry) = token.parse::<i64>() else {
                break;
            };
            self.pos += 1;
            signs.push(Sign::from_entry(entry)?);
        }
        Ok(signs)
    }
}

const KINDS: [(&str, SingularityKind); 6] = [
    ("saddle", SingularityKind::Saddle),
    ("node", SingularityKind::Node),
    ("weak_focus", SingularityKind::WeakFocus),
    ("strong_focus", SingularityKind::StrongFocus),
    ("semi_elementary", SingularityKind::SemiElementary),
    ("degenerate", SingularityKind::Degenerate),
];

const STABILITIES: [(&str, Stability); 4] = [
    ("stable", Stability::Stable),
    ("unstable", Stability::Unstable),
    ("center", Stability::Center),
    ("undetermined", Stability::Undetermined),
];

const SEPARATRIX_TYPES: [(&str, OrbitType); 4] = [
    ("stable", OrbitType::Stable),
    ("unstable", OrbitType::Unstable),
    ("center_stable", OrbitType::CenterStable),
    ("center_unstable", OrbitType::CenterUnstable),
];

const NOTATIONS: [(&str, SeriesNotation); 2] = [("tf", SeriesNotation::Tf), ("ft", SeriesNotation::Ft)];

fn parse_separatrix(tokens: &mut Tokens<'_>) -> Result<SeparatrixSeries, StudyError> {
    let kind = tokens.choice("separatrix type", &SEPARATRIX_TYPES)?;
    let epsilon = tokens.number("epsilon")?;
    let line = tokens.line();
    let direction = tokens.number("direction")?;
    if direction == 0.0 {
        return Err(StudyError::malformed(line, "separatrix direction must be non-zero"));
    }
    let notation = tokens.choice("series notation", &NOTATIONS)?;
    let mut trans = [[0.0; 2]; 2];
    for row in trans.iter_mut() {
        for entry in row.iter_mut() {
            *entry = tokens.number("transformation entry")?;
        }
    }
    let series = tokens.terms::<1>()?;
    Ok(SeparatrixSeries {
        kind,
        epsilon,
        direction: direction.signum(),
        notation,
        trans,
        series,
    })
}

fn parse_singularity(tokens: &mut Tokens<'_>) -> Result<Singularity, StudyError> {
    let kind = tokens.choice("singularity kind", &KINDS)?;
    let chart = tokens.chart()?;
    let x = tokens.number("singularity coordinate")?;
    let y = tokens.number("singularity coordinate")?;
    let stability = tokens.choice("stability", &STABILITIES)?;
    let mut singularity = Singularity::new(kind, chart, [x, y], stability);
    loop {
        let (line, token) = tokens.next("`separatrix` or `end`")?;
        match token {
            "separatrix" => singularity.separatrices.push(parse_separatrix(tokens)?),
            "end" => return Ok(singularity),
            other => {
                return Err(StudyError::malformed(
                    line,
                    format!("unexpected `{other}` in singularity"),
                ))
            }
        }
    }
}

fn parse_vector_field(tokens: &mut Tokens<'_>) -> Result<VectorFieldStudy, StudyError> {
    let mut field = VectorFieldStudy::new();
    loop {
        let (line, token) = tokens.next("vector field entry")?;
        match token {
            "dir" => {
                field.dir_vec_field = match tokens.integer("direction flag")? {
                    d @ (-1 | 1) => d as i32,
                    other => {
                        return Err(StudyError::malformed(
                            line,
                            format!("direction flag must be -1 or 1, found {other}"),
                        ))
                    }
                }
            }
            "field" => {
                let chart = tokens.chart()?;
                tokens.chart_terms(chart, &mut field.p)?;
                tokens.chart_terms(chart, &mut field.q)?;
            }
            "gcf" => {
                let chart = tokens.chart()?;
                tokens.chart_terms(chart, &mut field.gcf)?;
            }
            "singularity" => field.singularities.push(parse_singularity(tokens)?),
            "end" => return Ok(field),
            other => {
                return Err(StudyError::malformed(
                    line,
                    format!("unexpected `{other}` in vector field"),
                ))
            }
        }
    }
}

fn parse_curve(tokens: &mut Tokens<'_>) -> Result<SeparatingCurve, StudyError> {
    let mut curve = SeparatingCurve::default();
    loop {
        let (line, token) = tokens.next("`poly` or `end`")?;
        match token {
            "poly" => {
                let chart = tokens.chart()?;
                tokens.chart_terms(chart, &mut curve.polys)?;
            }
            "end" => return Ok(curve),
            other => {
                return Err(StudyError::malformed(
                    line,
                    format!("unexpected `{other}` in curve"),
                ))
            }
        }
    }
}

/// Parses a complete study. Nothing is returned unless the whole stream is valid.
pub fn parse_tables(text: &str) -> Result<LoadedTables, StudyError> {
    let mut tokens = Tokens::new(text);
    tokens.keyword("study")?;
    let field_count = tokens.count("vector field count")?;
    let curve_count = tokens.count("curve count")?;

    let mut fields = Vec::new();
    let mut curves = Vec::new();
    let mut regions = RegionResolver::new(curve_count);

    while tokens.peek().is_some() {
        let (line, token) = tokens.next("block")?;
        match token {
            "vector_field" => {
                if fields.len() == field_count {
                    return Err(StudyError::malformed(
                        line,
                        format!("more than {field_count} vector fields"),
                    ));
                }
                fields.push(parse_vector_field(&mut tokens)?);
            }
            "curve" => {
                if curves.len() == curve_count {
                    return Err(StudyError::malformed(
                        line,
                        format!("more than {curve_count} separating curves"),
                    ));
                }
                curves.push(parse_curve(&mut tokens)?);
            }
            "vf_region" => {
                let index = tokens.count("vector field index")?;
                if index >= field_count {
                    return Err(StudyError::UnknownVectorField {
                        index,
                        count: field_count,
                    });
                }
                let signs = tokens.signs()?;
                regions.register_vf_region(index, signs)?;
            }
            "curve_region" => {
                let index = tokens.count("curve index")?;
                if index >= curve_count {
                    return Err(StudyError::UnknownCurve {
                        index,
                        count: curve_count,
                    });
                }
                let signs = tokens.signs()?;
                regions.register_curve_region(index, signs)?;
            }
            other => {
                return Err(StudyError::malformed(line, format!("unknown block `{other}`")));
            }
        }
    }

    if fields.len() != field_count || curves.len() != curve_count {
        return Err(StudyError::malformed(
            tokens.line(),
            format!(
                "expected {field_count} vector fields and {curve_count} curves, found {} and {}",
                fields.len(),
                curves.len()
            ),
        ));
    }
    Ok(LoadedTables {
        fields,
        curves,
        regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::ChartSystem;

    const TWO_FIELDS: &str = "
study 2 1
# left half: saddle at the origin
vector_field
  dir 1
  field r2 1  1 0 1.0   1  0 1 -1.0
  field u1 1  0 1 -2.0  1  1 0 1.0
  gcf r2 1  0 0 1.0
  singularity saddle r2 0 0 undetermined
    separatrix unstable 0.05 1 tf 1 0 0 1 1  2 0.5
    separatrix stable 0.05 -1 ft 1 0 0 1 0
  end
end
vector_field
  dir -1
  field cylinder 1  1 1 0 2.5  0
end
curve
  poly r2 1  1 0 1.0
  poly u1 1  0 1 1.0
end
vf_region 0 -1
vf_region 1 1
curve_region 0 0
";

    #[test]
    fn parses_complete_study() {
        let loaded = parse_tables(TWO_FIELDS).expect("valid tables");
        assert_eq!(loaded.fields.len(), 2);
        assert_eq!(loaded.curves.len(), 1);
        assert_eq!(loaded.regions.vf_regions().len(), 2);
        assert_eq!(loaded.regions.curve_regions().len(), 1);

        let left = &loaded.fields[0];
        assert_eq!(left.dir_vec_field, 1);
        assert_eq!(left.p.evaluate(ChartId::R2, [2.0, 3.0]), 2.0);
        assert_eq!(left.q.evaluate(ChartId::R2, [2.0, 3.0]), -3.0);
        assert_eq!(left.p.evaluate(ChartId::U1, [2.0, 3.0]), -6.0);
        assert!(left.p.v2.is_zero());
        let saddle = &left.singularities[0];
        assert_eq!(saddle.kind, SingularityKind::Saddle);
        assert_eq!(saddle.separatrices.len(), 2);
        assert_eq!(saddle.separatrices[0].series.evaluate_at(2.0), 2.0);
        assert_eq!(saddle.separatrices[1].direction, -1.0);
        assert_eq!(saddle.separatrices[1].notation, SeriesNotation::Ft);

        let right = &loaded.fields[1];
        assert!(right.reverses_at_infinity());
        assert!(right.q.cylinder.is_zero());
        assert_eq!(right.p.cylinder.evaluate_cylindrical(2.0, 0.0), 5.0);

        let charts = ChartSystem::Poincare;
        assert_eq!(
            loaded
                .regions
                .resolve_vf(&charts, &loaded.curves, &charts.r2_to_sphere(-0.5, 0.2)),
            Some(0)
        );
    }

    #[test]
    fn truncated_stream_is_malformed() {
        let cut = &TWO_FIELDS[..TWO_FIELDS.find("singularity saddle").expect("present") + 20];
        match parse_tables(cut) {
            Err(StudyError::MalformedTable { .. }) => {}
            other => panic!("expected malformed table, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_tokens() {
        for text in [
            "study 1 0 vector_field field r2 1 1 0 abc 0 end",
            "study 1 0 vector_field field r3 0 0 end",
            "study 1 0 vector_field dir 2 end",
            "study 1 0 vector_field bogus end",
            "study 1 0 vector_field singinf 0 end",
            "study 1 0 vector_field field r2 1 1 0 inf 0 end",
            "study -1 0",
            "studies 1 0",
        ] {
            assert!(
                matches!(parse_tables(text), Err(StudyError::MalformedTable { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn counts_must_match_header() {
        assert!(matches!(
            parse_tables("study 2 0 vector_field end"),
            Err(StudyError::MalformedTable { .. })
        ));
        assert!(matches!(
            parse_tables("study 1 0 vector_field end vector_field end"),
            Err(StudyError::MalformedTable { .. })
        ));
    }

    #[test]
    fn region_errors_are_reported() {
        assert_eq!(
            parse_tables("study 1 2 vector_field end curve end curve end vf_region 0 1"),
            Err(StudyError::RegionConfigMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            parse_tables("study 1 1 vector_field end curve end vf_region 0 3"),
            Err(StudyError::InvalidSign(3))
        );
        assert_eq!(
            parse_tables("study 1 1 vector_field end curve end vf_region 4 1"),
            Err(StudyError::UnknownVectorField { index: 4, count: 1 })
        );
        assert_eq!(
            parse_tables("study 1 1 vector_field end curve end curve_region 1 1"),
            Err(StudyError::UnknownCurve { index: 1, count: 1 })
        );
    }

    #[test]
    fn negative_exponent_aborts_load() {
        assert_eq!(
            parse_tables("study 1 0 vector_field gcf r2 1 -1 0 1.0 end"),
            Err(StudyError::NegativeExponent(-1))
        );
    }

    #[test]
    fn error_reports_line() {
        let text = "study 1 0\nvector_field\n  dir 1\n  field r2 1 1 0 x 0\nend\n";
        assert_eq!(
            parse_tables(text),
            Err(StudyError::MalformedTable {
                line: 4,
                message: "expected finite coefficient, found `x`".to_string()
            })
        );
    }
}
