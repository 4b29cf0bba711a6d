use burn::data::dataset::Dataset;

use crate::domain::sample::PreparedSample;

/// Preprocessed split held in memory. Audio is resampled once,
/// before training, so every epoch reads identical features.
pub struct SpeechDataset {
    samples: Vec<PreparedSample>,
}

impl SpeechDataset {
    pub fn new(samples: Vec<PreparedSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    /// Class ids in dataset order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Total audio duration in seconds at the given rate
    pub fn total_seconds(&self, sample_rate: u32) -> f64 {
        let frames: usize = self.samples.iter().map(|s| s.features.len()).sum();
        frames as f64 / sample_rate.max(1) as f64
    }
}

impl Dataset<PreparedSample> for SpeechDataset {
    fn get(&self, index: usize) -> Option<PreparedSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_len() {
        let ds = SpeechDataset::new(vec![
            PreparedSample { features: vec![0.0; 16_000], label: 1 },
            PreparedSample { features: vec![0.0; 8_000],  label: 0 },
        ]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().label, 0);
        assert!(ds.get(2).is_none());
        assert_eq!(ds.labels(), vec![1, 0]);
        assert!((ds.total_seconds(16_000) - 1.5).abs() < 1e-9);
    }
}
