// ============================================================
// Layer 5 — Log-Uniform Candidate Sampler
// ============================================================
// Draws the negative classes for the sampled softmax loss.
//
// Token ids are assumed to be sorted by decreasing frequency,
// so ids are drawn from a log-uniform (Zipfian) distribution:
//
//   P(k) = (ln(k + 2) - ln(k + 1)) / ln(range + 1)
//
// Draws are unique within one sample: duplicates are
// rejected and drawn again, and the number of tries is kept
// so the expected count of each class can be corrected:
//
//   expected(k) = num_sampled * P(k)                    no rejections
//   expected(k) = 1 - (1 - P(k)) ^ num_tries            otherwise
//
// The loss subtracts ln(expected(k)) from every logit.
//
// Reference: Jean et al. (2015) On Using Very Large Target
//            Vocabulary for Neural Machine Translation

use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Seeded source of candidate samples over `[0, range)`.
pub struct CandidateSampler {
    range:       usize,
    num_sampled: usize,
    log_range:   f64,
    rng:         StdRng,
}

impl CandidateSampler {
    pub fn new(range: usize, num_sampled: usize, seed: u64) -> Self {
        Self {
            range,
            num_sampled,
            log_range: (range as f64 + 1.0).ln(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// True when sampling would cover the whole vocabulary and the
    /// exact softmax should be used instead.
    pub fn covers_vocabulary(&self) -> bool {
        self.num_sampled >= self.range
    }

    fn draw(&mut self) -> u32 {
        let u: f64 = self.rng.gen();
        let value = (u * self.log_range).exp() as usize;
        (value.saturating_sub(1)).min(self.range.saturating_sub(1)) as u32
    }

    /// `num_sampled` distinct ids (fewer only if the range is smaller).
    pub fn sample(&mut self) -> CandidateSample {
        let target = self.num_sampled.min(self.range);
        let mut seen = HashSet::with_capacity(target);
        let mut ids = Vec::with_capacity(target);
        let mut num_tries = 0u64;
        while ids.len() < target {
            let id = self.draw();
            num_tries += 1;
            if seen.insert(id) {
                ids.push(id);
            }
        }
        tracing::trace!("Sampled {} candidates in {} tries", ids.len(), num_tries);
        CandidateSample { ids, num_tries, log_range: self.log_range }
    }
}

/// One set of sampled negative ids plus what is needed to
/// correct for the sampling distribution.
#[derive(Debug, Clone)]
pub struct CandidateSample {
    ids:       Vec<u32>,
    num_tries: u64,
    log_range: f64,
}

impl CandidateSample {
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn probability(&self, id: u32) -> f64 {
        let k = id as f64;
        ((k + 2.0).ln() - (k + 1.0).ln()) / self.log_range
    }

    /// Expected number of times `id` shows up in a sample like this one.
    pub fn expected_count(&self, id: u32) -> f64 {
        let p = self.probability(id);
        if self.num_tries == self.ids.len() as u64 {
            p * self.num_tries as f64
        } else {
            -(self.num_tries as f64 * (-p).ln_1p()).exp_m1()
        }
    }

    pub fn log_expected_count(&self, id: u32) -> f32 {
        self.expected_count(id).ln() as f32
    }

    /// ln(expected count) for every sampled id, in sample order.
    pub fn log_expected_counts(&self) -> Vec<f32> {
        self.ids.iter().map(|&id| self.log_expected_count(id)).collect()
    }
}
