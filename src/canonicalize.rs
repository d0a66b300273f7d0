// ==============================================================================
// canonicalize.rs - Subgroup Canonicalizer
// ==============================================================================
// Description: Maps arbitrary LCA cluster ids onto clinically ordered
//              subgroup labels so results are comparable across runs
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::comorbidity::ComorbidityIndicators;
use crate::error::{PipelineError, PipelineResult};
use crate::table::{Column, SqlValue, TableRow};

/// Cluster count the canonical labels are defined for
pub const SUBGROUP_COUNT: u32 = 6;

/// Admission to subgroup assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgroupAssignment {
    pub hadm_id: i32,
    #[serde(rename = "subgroup_K6")]
    pub subgroup: u32,
}

/// Per-cluster prevalence of the conditions that define the labels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterProfile {
    pub cluster: u32,
    pub size: usize,
    pub pulmonary: f64,
    pub alcohol_liver: f64,
    pub renal: f64,
    pub diabetes_hypertension: f64,
    pub cardiac: f64,
}

#[derive(Default)]
struct Tally {
    size: usize,
    pulmonary: usize,
    alcohol_liver: usize,
    renal: usize,
    diabetes_hypertension: usize,
    cardiac: usize,
}

impl Tally {
    fn add(&mut self, row: &ComorbidityIndicators) {
        use crate::comorbidity::Elixhauser::*;
        self.size += 1;
        self.pulmonary += row.present(ChronicPulmonary) as usize;
        self.alcohol_liver += (row.present(AlcoholAbuse) && row.present(LiverDisease)) as usize;
        self.renal += row.present(RenalFailure) as usize;
        let diabetes = row.present(DiabetesUncomplicated) || row.present(DiabetesComplicated);
        self.diabetes_hypertension += (diabetes && row.present(Hypertension)) as usize;
        self.cardiac += row.present(CardiacArrhythmias) as usize;
    }

    fn profile(&self, cluster: u32) -> ClusterProfile {
        let mean = |count: usize| if self.size == 0 { 0.0 } else { count as f64 / self.size as f64 };
        ClusterProfile {
            cluster,
            size: self.size,
            pulmonary: mean(self.pulmonary),
            alcohol_liver: mean(self.alcohol_liver),
            renal: mean(self.renal),
            diabetes_hypertension: mean(self.diabetes_hypertension),
            cardiac: mean(self.cardiac),
        }
    }
}

/// Condition prevalence per raw cluster, ordered by cluster id
pub fn cluster_profiles(
    assignments: &[SubgroupAssignment],
    indicators: &[ComorbidityIndicators],
) -> Vec<ClusterProfile> {
    let by_hadm: HashMap<i32, &ComorbidityIndicators> = indicators.iter().map(|i| (i.hadm_id, i)).collect();
    let mut tallies: BTreeMap<u32, Tally> = BTreeMap::new();

    for assignment in assignments {
        let tally = tallies.entry(assignment.subgroup).or_default();
        if let Some(row) = by_hadm.get(&assignment.hadm_id) {
            tally.add(row);
        }
    }

    tallies
        .into_iter()
        .map(|(cluster, tally)| {
            if tally.size == 0 {
                warn!("Cluster {} has no comorbidity rows; its prevalences are 0", cluster);
            }
            tally.profile(cluster)
        })
        .collect()
}

/// Remove and return the profile with the highest key; lowest id wins ties
fn take_max(pool: &mut Vec<ClusterProfile>, key: fn(&ClusterProfile) -> f64) -> ClusterProfile {
    let mut best = 0;
    for (i, candidate) in pool.iter().enumerate().skip(1) {
        let (k, current) = (key(candidate), key(&pool[best]));
        if k > current || (k == current && candidate.cluster < pool[best].cluster) {
            best = i;
        }
    }
    pool.remove(best)
}

/// Raw cluster id → canonical label.
///
/// Labels are assigned winner-take-all, each winner leaving the pool:
/// 1 highest pulmonary, 3 highest alcohol with liver disease, 6 highest
/// cardiac arrhythmia; of the two clusters highest in diabetes with
/// hypertension the one higher in renal failure is 4 and the other 5; the
/// remaining cluster is 2.
pub fn canonical_mapping(profiles: &[ClusterProfile]) -> PipelineResult<BTreeMap<u32, u32>> {
    let found: BTreeSet<u32> = profiles.iter().map(|p| p.cluster).collect();
    let expected: BTreeSet<u32> = (1..=SUBGROUP_COUNT).collect();
    if found != expected || profiles.len() != SUBGROUP_COUNT as usize {
        return Err(PipelineError::UndefinedRelabeling { found: found.into_iter().collect() });
    }

    let mut pool: Vec<ClusterProfile> = profiles.to_vec();
    pool.sort_by_key(|p| p.cluster);
    let mut mapping = BTreeMap::new();

    mapping.insert(take_max(&mut pool, |p| p.pulmonary).cluster, 1);
    mapping.insert(take_max(&mut pool, |p| p.alcohol_liver).cluster, 3);
    mapping.insert(take_max(&mut pool, |p| p.cardiac).cluster, 6);

    let mut pair = vec![
        take_max(&mut pool, |p| p.diabetes_hypertension),
        take_max(&mut pool, |p| p.diabetes_hypertension),
    ];
    mapping.insert(take_max(&mut pair, |p| p.renal).cluster, 4);
    mapping.insert(pair[0].cluster, 5);

    mapping.insert(pool[0].cluster, 2);

    debug!("Canonical subgroup mapping: {:?}", mapping);
    Ok(mapping)
}

/// Relabel every assignment with its canonical subgroup
pub fn relabel(
    assignments: &[SubgroupAssignment],
    indicators: &[ComorbidityIndicators],
) -> PipelineResult<Vec<SubgroupAssignment>> {
    let profiles = cluster_profiles(assignments, indicators);
    let mapping = canonical_mapping(&profiles)?;

    let relabeled: Vec<SubgroupAssignment> = assignments
        .iter()
        .map(|a| SubgroupAssignment { hadm_id: a.hadm_id, subgroup: mapping[&a.subgroup] })
        .collect();

    info!("Relabeled {} assignments into {} canonical subgroups", relabeled.len(), SUBGROUP_COUNT);
    Ok(relabeled)
}

impl TableRow for SubgroupAssignment {
    fn columns() -> Vec<Column> {
        vec![Column::int("hadm_id"), Column::int("subgroup_K6")]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![self.hadm_id.into(), self.subgroup.into()]
    }
}
