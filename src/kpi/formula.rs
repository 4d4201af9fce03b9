//! KPI formulas.
//!
//! Built-in formulas cover totals, percentages and averages over metric
//! source aggregates. Anything else (composite health scores, forecasts) is
//! a [`KpiFormula`] registered in a [`FormulaCatalog`] and referenced by name.

use crate::core::{Error, Result};
use crate::kpi::params::KpiParams;
use crate::source::{AggregateQuery, MetricSource, SourceMetric};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A pluggable aggregation.
///
/// Implementations must be deterministic for a given source state and must
/// not mutate anything.
#[async_trait]
pub trait KpiFormula: Send + Sync {
    /// Name used to reference the formula from configuration.
    fn name(&self) -> &str;

    /// Compute the value over the source for the given parameters.
    async fn compute(&self, source: &dyn MetricSource, params: &KpiParams) -> Result<f64>;
}

/// `numerator / max(denominator, 1)`, or 0 when there is nothing to divide by.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        0.0
    } else {
        numerator / denominator.max(1.0)
    }
}

/// How a KPI value is derived.
#[derive(Clone)]
pub enum Formula {
    /// A single source aggregate.
    Total(SourceMetric),
    /// `100 * numerator / denominator`.
    Percentage {
        numerator: SourceMetric,
        denominator: SourceMetric,
    },
    /// `total / count`.
    Average {
        total: SourceMetric,
        count: SourceMetric,
    },
    /// Weighted sum of other formulas.
    Weighted(Vec<WeightedTerm>),
    /// A named pluggable formula.
    Custom(Arc<dyn KpiFormula>),
}

/// One term of a weighted formula.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedTerm {
    pub formula: Formula,
    pub weight: f64,
}

impl Formula {
    /// Evaluate against a metric source.
    ///
    /// Boxed because weighted formulas recurse.
    pub fn evaluate<'a>(
        &'a self,
        source: &'a dyn MetricSource,
        params: &'a KpiParams,
    ) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            match self {
                Formula::Total(metric) => fetch(source, metric, params).await,
                Formula::Percentage {
                    numerator,
                    denominator,
                } => {
                    let n = fetch(source, numerator, params).await?;
                    let d = fetch(source, denominator, params).await?;
                    Ok(safe_ratio(n, d) * 100.0)
                }
                Formula::Average { total, count } => {
                    let t = fetch(source, total, params).await?;
                    let c = fetch(source, count, params).await?;
                    Ok(safe_ratio(t, c))
                }
                Formula::Weighted(terms) => {
                    let mut sum = 0.0;
                    for term in terms {
                        sum += term.weight * term.formula.evaluate(source, params).await?;
                    }
                    Ok(sum)
                }
                Formula::Custom(formula) => formula.compute(source, params).await,
            }
        })
    }

    /// Source metrics this formula reads. Custom formulas are opaque.
    pub fn metrics(&self) -> Vec<SourceMetric> {
        match self {
            Formula::Total(metric) => vec![metric.clone()],
            Formula::Percentage {
                numerator,
                denominator,
            } => vec![numerator.clone(), denominator.clone()],
            Formula::Average { total, count } => vec![total.clone(), count.clone()],
            Formula::Weighted(terms) => {
                let mut metrics = Vec::new();
                for term in terms {
                    for metric in term.formula.metrics() {
                        if !metrics.contains(&metric) {
                            metrics.push(metric);
                        }
                    }
                }
                metrics
            }
            Formula::Custom(_) => Vec::new(),
        }
    }
}

async fn fetch(source: &dyn MetricSource, metric: &SourceMetric, params: &KpiParams) -> Result<f64> {
    let query = AggregateQuery::new(metric.clone(), params.window).with_filters(params.filters.clone());
    source.fetch(&query).await
}

impl std::fmt::Debug for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Formula::Total(metric) => f.debug_tuple("Total").field(metric).finish(),
            Formula::Percentage {
                numerator,
                denominator,
            } => f
                .debug_struct("Percentage")
                .field("numerator", numerator)
                .field("denominator", denominator)
                .finish(),
            Formula::Average { total, count } => f
                .debug_struct("Average")
                .field("total", total)
                .field("count", count)
                .finish(),
            Formula::Weighted(terms) => f.debug_tuple("Weighted").field(terms).finish(),
            Formula::Custom(formula) => f.debug_tuple("Custom").field(&formula.name()).finish(),
        }
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Formula::Total(a), Formula::Total(b)) => a == b,
            (
                Formula::Percentage {
                    numerator: n1,
                    denominator: d1,
                },
                Formula::Percentage {
                    numerator: n2,
                    denominator: d2,
                },
            ) => n1 == n2 && d1 == d2,
            (
                Formula::Average { total: t1, count: c1 },
                Formula::Average { total: t2, count: c2 },
            ) => t1 == t2 && c1 == c2,
            (Formula::Weighted(a), Formula::Weighted(b)) => a == b,
            (Formula::Custom(a), Formula::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Serialized form of a formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaSpec {
    Total {
        metric: SourceMetric,
    },
    Percentage {
        numerator: SourceMetric,
        denominator: SourceMetric,
    },
    Average {
        total: SourceMetric,
        count: SourceMetric,
    },
    Weighted {
        terms: Vec<WeightedSpec>,
    },
    Custom {
        name: String,
    },
}

/// Serialized weighted term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedSpec {
    pub formula: FormulaSpec,
    pub weight: f64,
}

impl FormulaSpec {
    /// Resolve into a runnable formula.
    pub fn build(&self, catalog: &FormulaCatalog) -> Result<Formula> {
        match self {
            FormulaSpec::Total { metric } => Ok(Formula::Total(metric.clone())),
            FormulaSpec::Percentage {
                numerator,
                denominator,
            } => Ok(Formula::Percentage {
                numerator: numerator.clone(),
                denominator: denominator.clone(),
            }),
            FormulaSpec::Average { total, count } => Ok(Formula::Average {
                total: total.clone(),
                count: count.clone(),
            }),
            FormulaSpec::Weighted { terms } => {
                if terms.is_empty() {
                    return Err(Error::InvalidConfig(
                        "weighted formula needs at least one term".to_string(),
                    ));
                }
                let mut built = Vec::with_capacity(terms.len());
                for term in terms {
                    if !term.weight.is_finite() {
                        return Err(Error::InvalidConfig(
                            "weighted formula has a non-finite weight".to_string(),
                        ));
                    }
                    built.push(WeightedTerm {
                        formula: term.formula.build(catalog)?,
                        weight: term.weight,
                    });
                }
                Ok(Formula::Weighted(built))
            }
            FormulaSpec::Custom { name } => catalog
                .get(name)
                .map(Formula::Custom)
                .ok_or_else(|| Error::InvalidConfig(format!("unknown custom formula: {}", name))),
        }
    }
}

/// Named custom formulas available to configuration.
#[derive(Clone, Default)]
pub struct FormulaCatalog {
    formulas: HashMap<String, Arc<dyn KpiFormula>>,
}

impl FormulaCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a formula. Names must be unique.
    pub fn register(&mut self, formula: Arc<dyn KpiFormula>) -> Result<()> {
        let name = formula.name().to_string();
        if self.formulas.contains_key(&name) {
            return Err(Error::InvalidConfig(format!(
                "custom formula {} is already registered",
                name
            )));
        }
        self.formulas.insert(name, formula);
        Ok(())
    }

    /// Look up a formula by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn KpiFormula>> {
        self.formulas.get(name).cloned()
    }

    /// Registered names.
    pub fn names(&self) -> Vec<&str> {
        self.formulas.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TimeWindow;
    use crate::source::StaticSource;
    use chrono::{Duration, TimeZone, Utc};

    fn params() -> KpiParams {
        let end = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        KpiParams::new(TimeWindow::trailing(end, Duration::days(30)).unwrap())
    }

    struct ClampedScore;

    #[async_trait]
    impl KpiFormula for ClampedScore {
        fn name(&self) -> &str {
            "clamped_score"
        }

        async fn compute(&self, source: &dyn MetricSource, params: &KpiParams) -> Result<f64> {
            let revenue = Formula::Total(SourceMetric::RevenueRecognized)
                .evaluate(source, params)
                .await?;
            Ok((revenue / 1000.0).clamp(0.0, 100.0))
        }
    }

    #[test]
    fn test_safe_ratio() {
        assert_eq!(safe_ratio(5.0, 0.0), 0.0);
        assert_eq!(safe_ratio(0.0, 0.0), 0.0);
        assert_eq!(safe_ratio(3.0, 4.0), 0.75);
        assert_eq!(safe_ratio(3.0, 0.5), 3.0);
    }

    #[tokio::test]
    async fn test_percentage_with_zero_denominator_is_zero() {
        let source = StaticSource::new()
            .with_value(SourceMetric::LeadsConverted, 0.0)
            .with_value(SourceMetric::LeadsCreated, 0.0);
        let formula = Formula::Percentage {
            numerator: SourceMetric::LeadsConverted,
            denominator: SourceMetric::LeadsCreated,
        };

        let value = formula.evaluate(&source, &params()).await.unwrap();
        assert_eq!(value, 0.0);
    }

    #[tokio::test]
    async fn test_percentage_and_average() {
        let source = StaticSource::new()
            .with_value(SourceMetric::LeadsConverted, 12.0)
            .with_value(SourceMetric::LeadsCreated, 48.0)
            .with_value(SourceMetric::ResponseMinutesTotal, 90.0)
            .with_value(SourceMetric::ResponsesRecorded, 60.0);

        let close_rate = Formula::Percentage {
            numerator: SourceMetric::LeadsConverted,
            denominator: SourceMetric::LeadsCreated,
        };
        assert_eq!(close_rate.evaluate(&source, &params()).await.unwrap(), 25.0);

        let response_time = Formula::Average {
            total: SourceMetric::ResponseMinutesTotal,
            count: SourceMetric::ResponsesRecorded,
        };
        assert_eq!(response_time.evaluate(&source, &params()).await.unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_weighted_formula() {
        let source = StaticSource::new()
            .with_value(SourceMetric::ProjectsCompleted, 10.0)
            .with_value(SourceMetric::AppointmentsCompleted, 20.0);
        let formula = Formula::Weighted(vec![
            WeightedTerm {
                formula: Formula::Total(SourceMetric::ProjectsCompleted),
                weight: 0.5,
            },
            WeightedTerm {
                formula: Formula::Total(SourceMetric::AppointmentsCompleted),
                weight: 0.25,
            },
        ]);

        assert_eq!(formula.evaluate(&source, &params()).await.unwrap(), 10.0);
        assert_eq!(formula.metrics().len(), 2);
    }

    #[tokio::test]
    async fn test_source_failure_propagates() {
        let source = StaticSource::new().with_value(SourceMetric::LeadsCreated, 10.0);
        source.set_available(false);

        let err = Formula::Total(SourceMetric::LeadsCreated)
            .evaluate(&source, &params())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_custom_formula_through_catalog() {
        let mut catalog = FormulaCatalog::new();
        catalog.register(Arc::new(ClampedScore)).unwrap();
        assert!(catalog.register(Arc::new(ClampedScore)).is_err());

        let spec = FormulaSpec::Custom {
            name: "clamped_score".to_string(),
        };
        let formula = spec.build(&catalog).unwrap();

        let source = StaticSource::new().with_value(SourceMetric::RevenueRecognized, 250_000.0);
        assert_eq!(formula.evaluate(&source, &params()).await.unwrap(), 100.0);
    }

    #[test]
    fn test_unknown_custom_formula_is_config_error() {
        let spec = FormulaSpec::Custom {
            name: "forecast".to_string(),
        };
        let err = spec.build(&FormulaCatalog::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_formula_spec_json() {
        let json = r#"{"kind":"weighted","terms":[
            {"formula":{"kind":"total","metric":"revenue_recognized"},"weight":0.001},
            {"formula":{"kind":"total","metric":{"custom":"reviews_five_star"}},"weight":2.0}
        ]}"#;
        let spec: FormulaSpec = serde_json::from_str(json).unwrap();
        let formula = spec.build(&FormulaCatalog::new()).unwrap();

        assert_eq!(
            formula.metrics(),
            vec![
                SourceMetric::RevenueRecognized,
                SourceMetric::Custom("reviews_five_star".to_string())
            ]
        );
    }
}
