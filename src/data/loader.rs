// ============================================================
// Layer 4 — Pair Loader
// ============================================================
// Reads training examples from a plain-text file, one pair
// per line:
//
//   <source ids><TAB><target ids>
//
// Ids are whitespace separated unsigned integers. Blank lines
// and lines starting with `#` are ignored. Target ids must not
// include BOS; the batcher adds it.
//
//   # copy task
//   5 6 7	5 6 7
//   9 4	9 4
//
// Any malformed line fails the whole load with its line number.

use anyhow::{bail, Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::pair::TokenPair;
use crate::domain::traits::PairSource;

pub struct PairLoader {
    path: PathBuf,
}

impl PairLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PairSource for PairLoader {
    fn load_all(&self) -> Result<Vec<TokenPair>> {
        // Missing corpus is not fatal here; the caller decides
        if !self.path.exists() {
            tracing::warn!("Pair file '{}' does not exist, returning no pairs", self.path.display());
            return Ok(Vec::new());
        }

        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        let pairs = parse_pairs(&text)
            .with_context(|| format!("Malformed pair file '{}'", self.path.display()))?;

        tracing::info!("Loaded {} pairs from '{}'", pairs.len(), self.path.display());
        Ok(pairs)
    }
}

pub fn parse_pairs(text: &str) -> Result<Vec<TokenPair>> {
    let mut pairs = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let pair = parse_line(line).with_context(|| format!("line {}", idx + 1))?;
        pairs.push(pair);
    }
    Ok(pairs)
}

pub fn parse_line(line: &str) -> Result<TokenPair> {
    let Some((source, target)) = line.split_once('\t') else {
        bail!("expected '<source ids>\\t<target ids>'");
    };
    if target.contains('\t') {
        bail!("more than two tab-separated fields");
    }
    Ok(TokenPair::new(parse_ids(source)?, parse_ids(target)?))
}

pub fn parse_ids(field: &str) -> Result<Vec<u32>> {
    field
        .split_whitespace()
        .map(|tok| tok.parse::<u32>().with_context(|| format!("invalid token id '{tok}'")))
        .collect()
}
