/// Which value groups a per-entity pairwise pass reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileScope {
    /// Every value group of every attribute the entity has. Self-healing:
    /// repairs links missed anywhere in the population.
    #[default]
    Population,

    /// Only the groups keyed by the triggering entity's own values.
    TouchedValues,
}

impl std::str::FromStr for ReconcileScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "population" => Ok(ReconcileScope::Population),
            "touched" | "touched_values" => Ok(ReconcileScope::TouchedValues),
            other => Err(format!(
                "unknown reconcile scope '{}' (expected 'population' or 'touched')",
                other
            )),
        }
    }
}

/// Configuration for the relationship detector
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Try the store's merge-on-pattern before the pairwise pass. Default: true.
    pub bulk_enabled: bool,

    /// Scope of the pairwise pass in `detect_for_entity`. `detect_all`
    /// always reconciles the full population. Default: Population.
    pub reconcile_scope: ReconcileScope,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            bulk_enabled: true,
            reconcile_scope: ReconcileScope::Population,
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bulk_enabled(mut self, enabled: bool) -> Self {
        self.bulk_enabled = enabled;
        self
    }

    pub fn with_reconcile_scope(mut self, scope: ReconcileScope) -> Self {
        self.reconcile_scope = scope;
        self
    }
}
