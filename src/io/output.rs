//! # Output Writers
//!
//! Per-iteration CSV streams and end-of-run result files. Chains write
//! through the [`IterationSink`] capability rather than owning files, so a
//! chain can run against real streams, a shared mutex-guarded writer, or
//! nothing at all. Streams are flushed after every row so concurrent chains
//! that crash leave complete lines behind.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::data::GenotypeData;
use crate::error::{DemixError, Result};

/// Receiver for a chain's per-iteration rows.
///
/// `iter` is 1-based in recorded iterations; burn-in iterations carry values
/// `<= 0`. Deme labels arrive 0-based and are converted at the CSV boundary.
pub trait IterationSink {
    fn likelihood_row(
        &mut self,
        k: usize,
        main_rep: usize,
        iter: i64,
        log_like_group: f64,
        log_like_joint: f64,
        alpha: f64,
    ) -> Result<()>;

    fn grouping_row(&mut self, k: usize, main_rep: usize, iter: i64, groups: &[usize])
        -> Result<()>;
}

/// Sink that discards everything.
pub struct NullSink;

impl IterationSink for NullSink {
    fn likelihood_row(&mut self, _: usize, _: usize, _: i64, _: f64, _: f64, _: f64) -> Result<()> {
        Ok(())
    }

    fn grouping_row(&mut self, _: usize, _: usize, _: i64, _: &[usize]) -> Result<()> {
        Ok(())
    }
}

/// CSV streams for the likelihood and posterior-grouping outputs.
pub struct StreamSinks {
    likelihood: Option<BufWriter<File>>,
    grouping: Option<BufWriter<File>>,
}

impl StreamSinks {
    /// Create the enabled streams under `out_prefix`, writing headers.
    pub fn create(
        out_prefix: &Path,
        likelihood_on: bool,
        grouping_on: bool,
        n_gene_copies: usize,
    ) -> Result<Self> {
        let likelihood = if likelihood_on {
            let mut w = BufWriter::new(File::create(suffixed(out_prefix, "likelihood.csv"))?);
            writeln!(w, "K,mainRep,iteration,logLikeGroup,logLikeJoint,alpha")?;
            Some(w)
        } else {
            None
        };
        let grouping = if grouping_on {
            let mut w = BufWriter::new(File::create(suffixed(out_prefix, "grouping.csv"))?);
            write!(w, "K,mainRep,iteration")?;
            for g in 0..n_gene_copies {
                write!(w, ",copy{}", g + 1)?;
            }
            writeln!(w)?;
            Some(w)
        } else {
            None
        };
        Ok(Self {
            likelihood,
            grouping,
        })
    }

    /// A sink with both streams disabled.
    pub fn disabled() -> Self {
        Self {
            likelihood: None,
            grouping: None,
        }
    }
}

impl IterationSink for StreamSinks {
    fn likelihood_row(
        &mut self,
        k: usize,
        main_rep: usize,
        iter: i64,
        log_like_group: f64,
        log_like_joint: f64,
        alpha: f64,
    ) -> Result<()> {
        if let Some(w) = self.likelihood.as_mut() {
            writeln!(
                w,
                "{},{},{},{},{},{}",
                k, main_rep, iter, log_like_group, log_like_joint, alpha
            )?;
            w.flush()?;
        }
        Ok(())
    }

    fn grouping_row(
        &mut self,
        k: usize,
        main_rep: usize,
        iter: i64,
        groups: &[usize],
    ) -> Result<()> {
        if let Some(w) = self.grouping.as_mut() {
            write!(w, "{},{},{}", k, main_rep, iter)?;
            for &d in groups {
                write!(w, ",{}", d + 1)?;
            }
            writeln!(w)?;
            w.flush()?;
        }
        Ok(())
    }
}

/// Clonable handle funneling rows from parallel chains into one
/// [`StreamSinks`].
#[derive(Clone)]
pub struct SharedSinks(Arc<Mutex<StreamSinks>>);

impl SharedSinks {
    pub fn new(sinks: StreamSinks) -> Self {
        Self(Arc::new(Mutex::new(sinks)))
    }
}

impl IterationSink for SharedSinks {
    fn likelihood_row(
        &mut self,
        k: usize,
        main_rep: usize,
        iter: i64,
        log_like_group: f64,
        log_like_joint: f64,
        alpha: f64,
    ) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| DemixError::algorithm("output stream lock poisoned"))?
            .likelihood_row(k, main_rep, iter, log_like_group, log_like_joint, alpha)
    }

    fn grouping_row(
        &mut self,
        k: usize,
        main_rep: usize,
        iter: i64,
        groups: &[usize],
    ) -> Result<()> {
        self.0
            .lock()
            .map_err(|_| DemixError::algorithm("output stream lock poisoned"))?
            .grouping_row(k, main_rep, iter, groups)
    }
}

/// Write a gene-level mean Q matrix.
pub fn write_q_gene<W: Write>(mut w: W, data: &GenotypeData, k: usize, q: &[Vec<f64>]) -> Result<()> {
    write!(w, "sample,locus,copy")?;
    for d in 0..k {
        write!(w, ",deme{}", d + 1)?;
    }
    writeln!(w)?;
    for (g, copy) in data.gene_copies().iter().enumerate() {
        write!(
            w,
            "{},{},{}",
            data.sample_id(copy.ind as usize),
            copy.locus + 1,
            copy.slot + 1
        )?;
        for d in 0..k {
            write!(w, ",{}", q[g][d])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Write an individual-level mean Q matrix.
pub fn write_q_ind<W: Write>(mut w: W, data: &GenotypeData, k: usize, q: &[Vec<f64>]) -> Result<()> {
    write!(w, "sample,pop")?;
    for d in 0..k {
        write!(w, ",deme{}", d + 1)?;
    }
    writeln!(w)?;
    for (i, row) in q.iter().enumerate() {
        write!(
            w,
            "{},{}",
            data.sample_id(i),
            data.pop_names()[data.pop_of(i)]
        )?;
        for d in 0..k {
            write!(w, ",{}", row[d])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Write a population-level mean Q matrix.
pub fn write_q_pop<W: Write>(mut w: W, data: &GenotypeData, k: usize, q: &[Vec<f64>]) -> Result<()> {
    write!(w, "pop,count")?;
    for d in 0..k {
        write!(w, ",deme{}", d + 1)?;
    }
    writeln!(w)?;
    for (p, row) in q.iter().enumerate() {
        write!(w, "{},{}", data.pop_names()[p], data.pop_counts()[p])?;
        for d in 0..k {
            write!(w, ",{}", row[d])?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Evidence estimates for one value of K.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRow {
    pub k: usize,
    pub harmonic_mean: f64,
    pub harmonic_std_err: f64,
    pub ti_estimate: Option<f64>,
    pub ti_std_err: Option<f64>,
    pub alpha_last: f64,
}

/// Write the evidence table for all K.
pub fn write_evidence<W: Write>(mut w: W, rows: &[EvidenceRow]) -> Result<()> {
    writeln!(
        w,
        "K,logEvidenceHarmonic,logEvidenceHarmonicSE,logEvidenceTI,logEvidenceTISE,alphaLast"
    )?;
    for row in rows {
        writeln!(
            w,
            "{},{},{},{},{},{}",
            row.k,
            row.harmonic_mean,
            row.harmonic_std_err,
            row.ti_estimate.map_or(String::from("NA"), |v| v.to_string()),
            row.ti_std_err.map_or(String::from("NA"), |v| v.to_string()),
            row.alpha_last
        )?;
    }
    w.flush()?;
    Ok(())
}

/// One row of the Evanno delta-K table.
///
/// First and second differences of the mean log evidence over K; entries
/// are undefined at the ends of the K range or when only a single repeat
/// was run (no between-repeat spread to scale by).
#[derive(Debug, Clone, Serialize)]
pub struct EvannoRow {
    pub k: usize,
    pub mean_evidence: f64,
    pub l_prime: Option<f64>,
    pub l_double_prime_abs: Option<f64>,
    pub delta_k: Option<f64>,
}

/// Write the Evanno delta-K table.
pub fn write_evanno<W: Write>(mut w: W, rows: &[EvannoRow]) -> Result<()> {
    writeln!(w, "K,meanLogEvidence,LPrime,LDoublePrimeAbs,deltaK")?;
    for row in rows {
        writeln!(
            w,
            "{},{},{},{},{}",
            row.k,
            row.mean_evidence,
            row.l_prime.map_or(String::from("NA"), |v| v.to_string()),
            row.l_double_prime_abs
                .map_or(String::from("NA"), |v| v.to_string()),
            row.delta_k.map_or(String::from("NA"), |v| v.to_string()),
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Posterior probability of each K after normalizing the log evidence.
#[derive(Debug, Clone, Serialize)]
pub struct NormalisedEvidenceRow {
    pub k: usize,
    pub harmonic: f64,
    pub ti: Option<f64>,
}

/// Write the normalised-evidence table.
pub fn write_evidence_normalised<W: Write>(
    mut w: W,
    rows: &[NormalisedEvidenceRow],
) -> Result<()> {
    writeln!(w, "K,posteriorHarmonic,posteriorTI")?;
    for row in rows {
        writeln!(
            w,
            "{},{},{}",
            row.k,
            row.harmonic,
            row.ti.map_or(String::from("NA"), |v| v.to_string()),
        )?;
    }
    w.flush()?;
    Ok(())
}

/// Serializable end-of-run summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub n_individuals: usize,
    pub n_loci: usize,
    pub n_gene_copies: usize,
    pub evidence: Vec<EvidenceRow>,
    pub evidence_normalised: Vec<NormalisedEvidenceRow>,
    pub evanno: Vec<EvannoRow>,
}

/// Write the run summary as JSON next to the CSV outputs.
pub fn write_run_summary(out_prefix: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(suffixed(out_prefix, "summary.json"))?;
    let mut w = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut w, summary)
        .map_err(|e| DemixError::algorithm(format!("failed to serialize run summary: {}", e)))?;
    w.flush()?;
    Ok(())
}

/// `prefix` + `.` + `suffix`, preserving the prefix's directory.
pub fn suffixed(prefix: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = prefix.file_name().map_or_else(
        || String::from("demix"),
        |n| n.to_string_lossy().into_owned(),
    );
    name.push('.');
    name.push_str(suffix);
    prefix.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GenotypeData;

    fn tiny_data() -> GenotypeData {
        GenotypeData::from_parts(
            vec![vec![vec![1]], vec![vec![2]]],
            vec!["s1".into(), "s2".into()],
            vec!["p1".into(), "p1".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_suffixed_paths() {
        let p = suffixed(Path::new("/tmp/run1"), "likelihood.csv");
        assert_eq!(p, Path::new("/tmp/run1.likelihood.csv"));
    }

    #[test]
    fn test_q_gene_csv_shape() {
        let data = tiny_data();
        let q = vec![vec![0.25, 0.75], vec![0.5, 0.5]];
        let mut buf = Vec::new();
        write_q_gene(&mut buf, &data, 2, &q).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "sample,locus,copy,deme1,deme2");
        assert_eq!(lines[1], "s1,1,1,0.25,0.75");
    }

    #[test]
    fn test_evidence_na_columns() {
        let rows = vec![EvidenceRow {
            k: 2,
            harmonic_mean: -12.5,
            harmonic_std_err: 0.3,
            ti_estimate: None,
            ti_std_err: None,
            alpha_last: 1.0,
        }];
        let mut buf = Vec::new();
        write_evidence(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.lines().nth(1).unwrap().contains("NA,NA"));
    }
}
