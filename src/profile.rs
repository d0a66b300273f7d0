// ==============================================================================
// profile.rs - Subgroup Profiles
// ==============================================================================
// Description: Morbidity counts, multimorbidity by age bracket and
//              per-subgroup condition prevalence / co-occurrence
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

use crate::canonicalize::SubgroupAssignment;
use crate::cohort::round_to;
use crate::comorbidity::{ComorbidityIndicators, Elixhauser};
use crate::error::PipelineResult;
use crate::models::IcuStay;
use crate::table::{write_csv_file, Column, SqlValue, TableRow};

pub const PREVALENCE_FILE: &str = "subgroup_prevalence.csv";
pub const COOCCURRENCE_FILE: &str = "subgroup_cooccurrence.csv";
pub const AGE_BRACKET_FILE: &str = "multimorbidity_by_age_bracket.csv";
pub const MORBIDITY_DISTRIBUTION_FILE: &str = "subgroup_morbidity_distribution.csv";

/// Admissions with at least this many conditions are multimorbid
pub const MULTIMORBID_THRESHOLD: u32 = 2;

/// Highest morbidity bin; larger counts fold into it
pub const MORBIDITY_BIN_CAP: u32 = 8;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Cohort admission with its number of coexisting conditions
#[derive(Debug, Clone, PartialEq)]
pub struct MorbidityCount {
    pub subject_id: i32,
    pub hadm_id: i32,
    pub icustay_id: i32,
    pub gender: Option<String>,
    pub deathtime: Option<NaiveDateTime>,
    pub admission_type: Option<String>,
    pub age: f64,
    pub los_days_icu: Option<f64>,
    pub los_days_hospital: Option<f64>,
    pub morbidity_count: u32,
}

fn days_between(start: NaiveDateTime, end: Option<NaiveDateTime>) -> Option<f64> {
    end.map(|end| round_to((end - start).num_seconds() as f64 / SECONDS_PER_DAY, 2))
}

/// Count conditions per cohort admission. Admissions without an indicator
/// row are left out; missing indicators count as absent.
pub fn morbidity_counts(cohort: &[IcuStay], indicators: &[ComorbidityIndicators]) -> Vec<MorbidityCount> {
    let by_hadm: HashMap<i32, &ComorbidityIndicators> = indicators.iter().map(|i| (i.hadm_id, i)).collect();

    let counts: Vec<MorbidityCount> = cohort
        .iter()
        .filter_map(|stay| {
            let row = by_hadm.get(&stay.hadm_id)?;
            Some(MorbidityCount {
                subject_id: stay.subject_id,
                hadm_id: stay.hadm_id,
                icustay_id: stay.icustay_id,
                gender: stay.gender.clone(),
                deathtime: stay.deathtime,
                admission_type: stay.admission_type.clone(),
                age: stay.age,
                los_days_icu: days_between(stay.icu_intime, stay.icu_outtime),
                los_days_hospital: days_between(stay.admittime, stay.dischtime),
                morbidity_count: row.count(),
            })
        })
        .collect();

    if counts.len() < cohort.len() {
        warn!("{} cohort admissions have no comorbidity row", cohort.len() - counts.len());
    }
    info!("Computed morbidity counts for {} admissions", counts.len());
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeBracket {
    From16To24,
    From25To44,
    From45To64,
    From65To84,
    From85,
}

impl AgeBracket {
    /// Bracket of the age rounded to whole years
    pub fn from_age(age: f64) -> Self {
        match age.round() {
            a if (16.0..=24.0).contains(&a) => AgeBracket::From16To24,
            a if (25.0..=44.0).contains(&a) => AgeBracket::From25To44,
            a if (45.0..=64.0).contains(&a) => AgeBracket::From45To64,
            a if (65.0..=84.0).contains(&a) => AgeBracket::From65To84,
            _ => AgeBracket::From85,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeBracket::From16To24 => "16-24",
            AgeBracket::From25To44 => "25-44",
            AgeBracket::From45To64 => "45-64",
            AgeBracket::From65To84 => "65-84",
            AgeBracket::From85 => "≥85",
        }
    }

    pub fn sort_key(&self) -> u32 {
        *self as u32 + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultimorbidityBracket {
    pub bracket: AgeBracket,
    pub n_in_bracket: usize,
    pub n_multimorbid: usize,
    pub pct_multimorbid: f64,
    /// Standard error of the percentage
    pub se_pct: f64,
    pub sd_pct: f64,
}

/// Share of multimorbid admissions per age bracket, in bracket order.
/// Brackets without admissions are omitted.
pub fn multimorbidity_by_age_bracket(counts: &[MorbidityCount]) -> Vec<MultimorbidityBracket> {
    let mut tallies: BTreeMap<AgeBracket, (usize, usize)> = BTreeMap::new();
    for row in counts {
        let tally = tallies.entry(AgeBracket::from_age(row.age)).or_default();
        tally.0 += 1;
        tally.1 += (row.morbidity_count >= MULTIMORBID_THRESHOLD) as usize;
    }

    tallies
        .into_iter()
        .map(|(bracket, (n, multimorbid))| {
            let p = multimorbid as f64 / n as f64;
            MultimorbidityBracket {
                bracket,
                n_in_bracket: n,
                n_multimorbid: multimorbid,
                pct_multimorbid: 100.0 * p,
                se_pct: 100.0 * (p * (1.0 - p) / n as f64).sqrt(),
                sd_pct: 100.0 * (p * (1.0 - p)).sqrt(),
            }
        })
        .collect()
}

/// Prevalence of one condition inside a subgroup
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionPrevalence {
    pub subgroup: u32,
    pub condition: Elixhauser,
    pub count: usize,
    pub subgroup_size: usize,
    pub prevalence: f64,
}

/// Share of a subgroup with both conditions present
#[derive(Debug, Clone, PartialEq)]
pub struct Cooccurrence {
    pub subgroup: u32,
    pub condition_a: Elixhauser,
    pub condition_b: Elixhauser,
    pub count: usize,
    pub subgroup_size: usize,
    pub prevalence: f64,
}

fn share(count: usize, size: usize) -> f64 {
    if size == 0 {
        0.0
    } else {
        count as f64 / size as f64
    }
}

/// Members of each subgroup that have an indicator row
fn members<'a>(
    assignments: &[SubgroupAssignment],
    indicators: &'a [ComorbidityIndicators],
) -> BTreeMap<u32, Vec<&'a ComorbidityIndicators>> {
    let by_hadm: HashMap<i32, &ComorbidityIndicators> = indicators.iter().map(|i| (i.hadm_id, i)).collect();
    let mut groups: BTreeMap<u32, Vec<&ComorbidityIndicators>> = BTreeMap::new();
    for assignment in assignments {
        let group = groups.entry(assignment.subgroup).or_default();
        if let Some(row) = by_hadm.get(&assignment.hadm_id) {
            group.push(row);
        }
    }
    groups
}

pub fn subgroup_prevalence(
    assignments: &[SubgroupAssignment],
    indicators: &[ComorbidityIndicators],
) -> Vec<ConditionPrevalence> {
    let mut rows = Vec::new();
    for (subgroup, group) in members(assignments, indicators) {
        for condition in Elixhauser::ALL {
            let count = group.iter().filter(|r| r.present(condition)).count();
            rows.push(ConditionPrevalence {
                subgroup,
                condition,
                count,
                subgroup_size: group.len(),
                prevalence: share(count, group.len()),
            });
        }
    }
    rows
}

/// Co-occurrence for every unordered condition pair, in column order
pub fn subgroup_cooccurrence(
    assignments: &[SubgroupAssignment],
    indicators: &[ComorbidityIndicators],
) -> Vec<Cooccurrence> {
    let mut rows = Vec::new();
    for (subgroup, group) in members(assignments, indicators) {
        for (i, &a) in Elixhauser::ALL.iter().enumerate() {
            for &b in &Elixhauser::ALL[i + 1..] {
                let count = group.iter().filter(|r| r.present(a) && r.present(b)).count();
                rows.push(Cooccurrence {
                    subgroup,
                    condition_a: a,
                    condition_b: b,
                    count,
                    subgroup_size: group.len(),
                    prevalence: share(count, group.len()),
                });
            }
        }
    }
    rows
}

/// Share of a subgroup with a given number of conditions
#[derive(Debug, Clone, PartialEq)]
pub struct MorbidityDistribution {
    pub subgroup: u32,
    /// Condition count, capped at `MORBIDITY_BIN_CAP`
    pub morbidity_bin: u32,
    pub n: usize,
    pub pct: f64,
}

pub fn subgroup_morbidity_distribution(
    assignments: &[SubgroupAssignment],
    counts: &[MorbidityCount],
) -> Vec<MorbidityDistribution> {
    let by_hadm: HashMap<i32, u32> = counts.iter().map(|c| (c.hadm_id, c.morbidity_count)).collect();
    let mut bins: BTreeMap<u32, BTreeMap<u32, usize>> = BTreeMap::new();
    for assignment in assignments {
        if let Some(count) = by_hadm.get(&assignment.hadm_id) {
            *bins
                .entry(assignment.subgroup)
                .or_default()
                .entry((*count).min(MORBIDITY_BIN_CAP))
                .or_default() += 1;
        }
    }

    bins.into_iter()
        .flat_map(|(subgroup, bins)| {
            let total: usize = bins.values().sum();
            bins.into_iter().map(move |(morbidity_bin, n)| MorbidityDistribution {
                subgroup,
                morbidity_bin,
                n,
                pct: 100.0 * share(n, total),
            })
        })
        .collect()
}

/// Write every subgroup profile CSV into `dir`
pub fn write_profiles(
    dir: &Path,
    assignments: &[SubgroupAssignment],
    indicators: &[ComorbidityIndicators],
    counts: &[MorbidityCount],
) -> PipelineResult<()> {
    std::fs::create_dir_all(dir)?;

    let prevalence = subgroup_prevalence(assignments, indicators);
    write_csv_file(&prevalence, &dir.join(PREVALENCE_FILE))?;

    let cooccurrence = subgroup_cooccurrence(assignments, indicators);
    write_csv_file(&cooccurrence, &dir.join(COOCCURRENCE_FILE))?;

    let brackets = multimorbidity_by_age_bracket(counts);
    write_csv_file(&brackets, &dir.join(AGE_BRACKET_FILE))?;

    let distribution = subgroup_morbidity_distribution(assignments, counts);
    write_csv_file(&distribution, &dir.join(MORBIDITY_DISTRIBUTION_FILE))?;

    info!(
        "Wrote subgroup profiles to {:?}: {} prevalence, {} co-occurrence, {} age bracket rows",
        dir,
        prevalence.len(),
        cooccurrence.len(),
        brackets.len()
    );
    Ok(())
}

impl TableRow for MorbidityCount {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subject_id"),
            Column::int("hadm_id"),
            Column::int("icustay_id"),
            Column::text("gender"),
            Column::timestamp("deathtime"),
            Column::text("admission_type"),
            Column::float("age"),
            Column::float("los_days_icu"),
            Column::float("los_days_hospital"),
            Column::int("morbidity_count"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subject_id.into(),
            self.hadm_id.into(),
            self.icustay_id.into(),
            (&self.gender).into(),
            self.deathtime.into(),
            (&self.admission_type).into(),
            self.age.into(),
            self.los_days_icu.into(),
            self.los_days_hospital.into(),
            self.morbidity_count.into(),
        ]
    }
}

impl TableRow for MultimorbidityBracket {
    fn columns() -> Vec<Column> {
        vec![
            Column::text("age_bracket"),
            Column::int("n_in_bracket"),
            Column::int("n_multimorbid"),
            Column::float("pct_multimorbid"),
            Column::float("se_pct"),
            Column::float("sd_pct"),
            Column::int("sort_key"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.bracket.label().into(),
            self.n_in_bracket.into(),
            self.n_multimorbid.into(),
            self.pct_multimorbid.into(),
            self.se_pct.into(),
            self.sd_pct.into(),
            self.bracket.sort_key().into(),
        ]
    }
}

impl TableRow for ConditionPrevalence {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subgroup_K6"),
            Column::text("condition"),
            Column::int("count"),
            Column::int("subgroup_size"),
            Column::float("prevalence"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subgroup.into(),
            self.condition.column().into(),
            self.count.into(),
            self.subgroup_size.into(),
            self.prevalence.into(),
        ]
    }
}

impl TableRow for Cooccurrence {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subgroup_K6"),
            Column::text("condition_a"),
            Column::text("condition_b"),
            Column::int("count"),
            Column::int("subgroup_size"),
            Column::float("cooccurrence_prevalence"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subgroup.into(),
            self.condition_a.column().into(),
            self.condition_b.column().into(),
            self.count.into(),
            self.subgroup_size.into(),
            self.prevalence.into(),
        ]
    }
}

impl TableRow for MorbidityDistribution {
    fn columns() -> Vec<Column> {
        vec![
            Column::int("subgroup_K6"),
            Column::int("morbidity_bin"),
            Column::int("n"),
            Column::float("pct"),
        ]
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.subgroup.into(),
            self.morbidity_bin.into(),
            self.n.into(),
            self.pct.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comorbidity::INDICATOR_COUNT;
    use crate::testing::{stay, ts};
    use Elixhauser::*;

    fn indicators(hadm_id: i32, present: &[Elixhauser]) -> ComorbidityIndicators {
        let mut values = [Some(0); INDICATOR_COUNT];
        for condition in present {
            values[*condition as usize] = Some(1);
        }
        ComorbidityIndicators::new(hadm_id, values)
    }

    fn count(hadm_id: i32, age: f64, morbidity_count: u32) -> MorbidityCount {
        let mut row = morbidity_counts(&[stay(hadm_id, hadm_id, hadm_id)], &[indicators(hadm_id, &[])]).remove(0);
        row.age = age;
        row.morbidity_count = morbidity_count;
        row
    }

    fn assign(hadm_id: i32, subgroup: u32) -> SubgroupAssignment {
        SubgroupAssignment { hadm_id, subgroup }
    }

    #[test]
    fn test_morbidity_counts_and_length_of_stay() {
        let mut values = [Some(0); INDICATOR_COUNT];
        values[Hypertension as usize] = Some(1);
        values[Obesity as usize] = None;
        values[Depression as usize] = Some(1);
        let with_missing = ComorbidityIndicators::new(2, values);
        let cohort = vec![stay(1, 1, 10), stay(2, 2, 20), stay(3, 3, 30)];
        let rows = vec![indicators(1, &[]), with_missing];

        let counts = morbidity_counts(&cohort, &rows);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].morbidity_count, 0);
        assert_eq!(counts[1].morbidity_count, 2);
        assert_eq!(counts[0].los_days_icu, Some(3.0));
        // 2150-01-01 02:00 to 2150-01-10 12:00
        assert_eq!(counts[0].los_days_hospital, Some(9.42));
    }

    #[test]
    fn test_missing_outtime_leaves_icu_los_empty() {
        let mut s = stay(1, 1, 10);
        s.icu_outtime = None;
        s.dischtime = Some(ts("2150-01-02 02:00"));
        let counts = morbidity_counts(&[s], &[indicators(1, &[])]);
        assert_eq!(counts[0].los_days_icu, None);
        assert_eq!(counts[0].los_days_hospital, Some(1.0));
    }

    #[test]
    fn test_age_brackets_use_rounded_age() {
        assert_eq!(AgeBracket::from_age(24.4), AgeBracket::From16To24);
        assert_eq!(AgeBracket::from_age(24.5), AgeBracket::From25To44);
        assert_eq!(AgeBracket::from_age(84.49), AgeBracket::From65To84);
        assert_eq!(AgeBracket::from_age(89.0), AgeBracket::From85);
        assert_eq!(AgeBracket::From85.sort_key(), 5);
    }

    #[test]
    fn test_multimorbidity_by_bracket() {
        let counts = vec![
            count(1, 30.0, 0),
            count(2, 30.0, 2),
            count(3, 40.0, 5),
            count(4, 40.0, 1),
            count(5, 70.0, 3),
        ];
        let brackets = multimorbidity_by_age_bracket(&counts);

        assert_eq!(brackets.len(), 2);
        assert_eq!(brackets[0].bracket, AgeBracket::From25To44);
        assert_eq!(brackets[0].n_in_bracket, 4);
        assert_eq!(brackets[0].n_multimorbid, 2);
        assert!((brackets[0].pct_multimorbid - 50.0).abs() < 1e-9);
        assert!((brackets[0].se_pct - 25.0).abs() < 1e-9);
        assert!((brackets[0].sd_pct - 50.0).abs() < 1e-9);
        assert_eq!(brackets[1].bracket, AgeBracket::From65To84);
        assert_eq!(brackets[1].se_pct, 0.0);
    }

    #[test]
    fn test_prevalence_and_cooccurrence() {
        let assignments = vec![assign(1, 1), assign(2, 1), assign(3, 2), assign(9, 3)];
        let rows = vec![
            indicators(1, &[Hypertension, Obesity]),
            indicators(2, &[Hypertension]),
            indicators(3, &[Depression]),
        ];

        let prevalence = subgroup_prevalence(&assignments, &rows);
        assert_eq!(prevalence.len(), 3 * INDICATOR_COUNT);
        let hypertension = prevalence.iter().find(|p| p.subgroup == 1 && p.condition == Hypertension).unwrap();
        assert_eq!(hypertension.prevalence, 1.0);
        let empty = prevalence.iter().find(|p| p.subgroup == 3).unwrap();
        assert_eq!((empty.subgroup_size, empty.prevalence), (0, 0.0));

        let pairs = subgroup_cooccurrence(&assignments, &rows);
        assert_eq!(pairs.len(), 3 * INDICATOR_COUNT * (INDICATOR_COUNT - 1) / 2);
        let pair = pairs
            .iter()
            .find(|c| c.subgroup == 1 && c.condition_a == Hypertension && c.condition_b == Obesity)
            .unwrap();
        assert_eq!(pair.count, 1);
        assert_eq!(pair.prevalence, 0.5);
    }

    #[test]
    fn test_morbidity_distribution_caps_bins() {
        let counts = vec![count(1, 50.0, 0), count(2, 50.0, 12), count(3, 50.0, 8), count(4, 50.0, 2)];
        let assignments = vec![assign(1, 1), assign(2, 1), assign(3, 1), assign(4, 2)];

        let distribution = subgroup_morbidity_distribution(&assignments, &counts);
        assert_eq!(distribution.len(), 3);
        assert_eq!(distribution[1].morbidity_bin, MORBIDITY_BIN_CAP);
        assert_eq!(distribution[1].n, 2);
        assert!((distribution[0].pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(distribution[2].pct, 100.0);
    }

    #[test]
    fn test_write_profiles_creates_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let assignments = vec![assign(1, 1)];
        let rows = vec![indicators(1, &[Aids])];
        let counts = vec![count(1, 20.0, 1)];

        write_profiles(dir.path(), &assignments, &rows, &counts).unwrap();

        for file in [PREVALENCE_FILE, COOCCURRENCE_FILE, AGE_BRACKET_FILE, MORBIDITY_DISTRIBUTION_FILE] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
        let brackets = std::fs::read_to_string(dir.path().join(AGE_BRACKET_FILE)).unwrap();
        assert!(brackets.starts_with("age_bracket,n_in_bracket,"));
        assert!(brackets.contains("16-24,1,0,0,0,0,1"));
    }
}
