use crate::detector::{DetectionReport, DetectorConfig, ReconcileScope};
use crate::error::Result;
use crate::matcher::{BulkMatcher, PairwiseMatcher};
use crate::schema::{attributes_for, AttributeSpec};
use crate::storage::{ConnectionStore, EntityStore};
use crate::types::{Entity, EntityKind};
use std::sync::Arc;
use std::time::Instant;

/// Orchestrates both matchers.
///
/// Each call is a stateless pass that runs to completion on the caller's
/// thread. Concurrent passes are not excluded from each other; the store's
/// atomic insert-if-absent keeps them from duplicating connections.
pub struct RelationshipDetector<S: EntityStore + ConnectionStore> {
    storage: Arc<S>,
    bulk: BulkMatcher<S>,
    pairwise: PairwiseMatcher<S>,
    config: DetectorConfig,
}

impl<S: EntityStore + ConnectionStore> RelationshipDetector<S> {
    pub fn new(storage: Arc<S>, config: DetectorConfig) -> Self {
        Self {
            bulk: BulkMatcher::new(storage.clone()),
            pairwise: PairwiseMatcher::new(storage.clone()),
            storage,
            config,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect relationships after `entity` was created or updated.
    ///
    /// Tries the bulk matcher for each attribute the entity has, then always
    /// runs the pairwise matcher for those attributes. Never fails.
    pub fn detect_for_entity(&self, entity: &Entity) -> DetectionReport {
        let start = Instant::now();
        let mut report = DetectionReport::new();
        let kind = entity.kind();

        log::info!("Detecting relationships for {} {}", kind, entity.id());

        let present: Vec<(&AttributeSpec, &str)> = attributes_for(kind)
            .iter()
            .filter_map(|attr| attr.value(entity).map(|v| (attr, v)))
            .collect();

        if self.config.bulk_enabled {
            for (attr, _) in &present {
                match self.bulk.match_by_attribute(kind, attr) {
                    Ok(created) => report.add_bulk_edges(created),
                    Err(e) if e.is_store_failure() => {
                        log::warn!(
                            "Bulk detection on {}.{} failed for {}, using pairwise matcher: {}",
                            kind,
                            attr.name,
                            entity.id(),
                            e
                        );
                        report.record_bulk_failure(format!("{}.{}: {}", kind, attr.name, e));
                    }
                    Err(e) => {
                        log::error!("Bulk detection on {}.{} rejected: {}", kind, attr.name, e);
                        report.record_bulk_failure(format!("{}.{}: {}", kind, attr.name, e));
                    }
                }
            }
        } else {
            report.bulk_succeeded = false;
        }

        if !present.is_empty() {
            if let Err(e) = self.reconcile_entity(kind, &present, &mut report) {
                log::error!("Pairwise detection also failed for {} {}: {}", kind, entity.id(), e);
                report.record_error(format!("{}: {}", kind, e));
            }
        }

        report.set_duration(start.elapsed());
        log::info!("Detection for {} {}: {}", kind, entity.id(), report.summary());
        report
    }

    /// Full rebuild: bulk matcher for every attribute of every kind, then a
    /// full pairwise reconciliation. Never fails.
    pub fn detect_all(&self) -> DetectionReport {
        let start = Instant::now();
        let mut report = DetectionReport::new();

        log::info!("Running full relationship detection across all entities");

        if self.config.bulk_enabled {
            // The bulk phase succeeds or fails as a group
            if let Err(e) = self.bulk_all(&mut report) {
                log::warn!("Bulk relationship detection failed, using pairwise matcher: {}", e);
                report.record_bulk_failure(e.to_string());
            }
        } else {
            report.bulk_succeeded = false;
        }

        for kind in EntityKind::all() {
            if let Err(e) = self.reconcile_kind(kind, &mut report) {
                log::error!("Pairwise detection failed for {}: {}", kind, e);
                report.record_error(format!("{}: {}", kind, e));
            }
        }

        report.set_duration(start.elapsed());
        log::info!("Completed full relationship detection: {}", report.summary());
        report
    }

    fn bulk_all(&self, report: &mut DetectionReport) -> Result<()> {
        for kind in EntityKind::all() {
            for attr in attributes_for(kind) {
                report.add_bulk_edges(self.bulk.match_by_attribute(kind, attr)?);
            }
        }
        Ok(())
    }

    fn reconcile_kind(&self, kind: EntityKind, report: &mut DetectionReport) -> Result<()> {
        let population = self.storage.list_entities(kind)?;
        log::info!("Processing {} {} entities for relationship detection", population.len(), kind);

        for attr in attributes_for(kind) {
            report.add_pairwise_edges(self.pairwise.reconcile_attribute(&population, attr)?);
        }
        Ok(())
    }

    fn reconcile_entity(
        &self,
        kind: EntityKind,
        present: &[(&AttributeSpec, &str)],
        report: &mut DetectionReport,
    ) -> Result<()> {
        // Always re-read the population: nothing is cached between passes
        let population = self.storage.list_entities(kind)?;

        for (attr, value) in present {
            let created = match self.config.reconcile_scope {
                ReconcileScope::Population => self.pairwise.reconcile_attribute(&population, attr)?,
                ReconcileScope::TouchedValues => {
                    self.pairwise.reconcile_values(&population, attr, &[*value])?
                }
            };
            report.add_pairwise_edges(created);
        }
        Ok(())
    }
}
