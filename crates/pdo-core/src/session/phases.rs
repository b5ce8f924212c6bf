//! Declarative phase table: ordered phase name -> fetch operation.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{FetchError, LoadError};
use crate::Payload;

/// Phase names of the reference four-phase load.
pub const REFERENCE_PHASES: [&str; 4] = ["quote", "chart", "fundamentals", "news"];

/// Fetch operation bound to one phase.
#[async_trait]
pub trait PhaseFetcher: Send + Sync {
    async fn fetch(&self, subject: &str) -> Result<Payload, FetchError>;
}

/// Adapts an async closure into a [`PhaseFetcher`].
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F, Fut> PhaseFetcher for FnFetcher<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, FetchError>> + Send,
{
    async fn fetch(&self, subject: &str) -> Result<Payload, FetchError> {
        (self.0)(subject.to_owned()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhasePriority {
    Critical,
    High,
    Normal,
    Low,
}

/// One declared phase.
#[derive(Clone)]
pub struct PhaseSpec {
    pub name: String,
    pub priority: PhasePriority,
    /// Delay used when the network profile has no entry for this phase.
    pub nominal_delay: Duration,
    pub fetcher: Arc<dyn PhaseFetcher>,
}

impl fmt::Debug for PhaseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseSpec")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("nominal_delay", &self.nominal_delay)
            .finish_non_exhaustive()
    }
}

/// Ordered phases; index 0 is the critical phase and always present.
#[derive(Debug, Clone)]
pub struct PhaseTable {
    phases: Vec<PhaseSpec>,
}

impl PhaseTable {
    /// Start a table with its critical phase.
    pub fn builder(critical: impl Into<String>, fetcher: Arc<dyn PhaseFetcher>) -> PhaseTableBuilder {
        PhaseTableBuilder {
            phases: vec![PhaseSpec {
                name: critical.into(),
                priority: PhasePriority::Critical,
                nominal_delay: Duration::ZERO,
                fetcher,
            }],
        }
    }

    /// The reference load: `quote` now, then `chart`, `fundamentals`, `news`.
    /// `fetcher_for` supplies the fetch operation for each phase name.
    pub fn reference<F>(mut fetcher_for: F) -> Self
    where
        F: FnMut(&str) -> Arc<dyn PhaseFetcher>,
    {
        let [quote, chart, fundamentals, news] = REFERENCE_PHASES;
        let builder = PhaseTable::builder(quote, fetcher_for(quote))
            .deferred(chart, PhasePriority::High, Duration::from_millis(200), fetcher_for(chart))
            .deferred(
                fundamentals,
                PhasePriority::Normal,
                Duration::from_millis(500),
                fetcher_for(fundamentals),
            )
            .deferred(news, PhasePriority::Low, Duration::from_millis(1000), fetcher_for(news));
        // Names are the distinct constants above.
        PhaseTable {
            phases: builder.phases,
        }
    }

    pub fn critical(&self) -> &PhaseSpec {
        &self.phases[0]
    }

    /// Phases after the critical one, in declared order.
    pub fn deferred(&self) -> &[PhaseSpec] {
        &self.phases[1..]
    }

    pub fn names(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct PhaseTableBuilder {
    phases: Vec<PhaseSpec>,
}

impl PhaseTableBuilder {
    /// Append a deferred phase.
    pub fn deferred(
        mut self,
        name: impl Into<String>,
        priority: PhasePriority,
        nominal_delay: Duration,
        fetcher: Arc<dyn PhaseFetcher>,
    ) -> Self {
        self.phases.push(PhaseSpec {
            name: name.into(),
            priority,
            nominal_delay,
            fetcher,
        });
        self
    }

    /// Fails if two phases share a name.
    pub fn build(self) -> Result<PhaseTable, LoadError> {
        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.name.as_str()) {
                return Err(LoadError::DuplicatePhase(phase.name.clone()));
            }
        }
        Ok(PhaseTable {
            phases: self.phases,
        })
    }
}
