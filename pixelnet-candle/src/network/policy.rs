use anyhow::{Context, Result};
use candle_core::{Device, Tensor, D};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};

/// Draws one action per row of a `[N, n_actions]` probability matrix.
pub fn sample_actions<R: Rng + ?Sized>(policy: &Tensor, rng: &mut R) -> Result<Vec<u32>> {
    let probs = policy.to_device(&Device::Cpu)?.to_vec2::<f32>()?;

    probs
        .iter()
        .map(|row| {
            let dist = WeightedIndex::new(row).context("invalid action probabilities")?;
            Ok(dist.sample(rng) as u32)
        })
        .collect()
}

/// Selects `log_policy[i, actions[i]]` for every row, `[N]`.
pub fn log_policy_of_actions(log_policy: &Tensor, actions: &[u32]) -> Result<Tensor> {
    let n = actions.len();
    let ixs = Tensor::from_slice(actions, (n, 1), log_policy.device())?;
    Ok(log_policy.gather(&ixs, D::Minus1)?.squeeze(D::Minus1)?)
}

/// Entropy `-sum(pi * log pi)` of each row, `[N]`.
pub fn entropy(policy: &Tensor, log_policy: &Tensor) -> Result<Tensor> {
    Ok((policy * log_policy)?.sum(D::Minus1)?.neg()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_sample_degenerate_policy() -> Result<()> {
        let policy = Tensor::new(&[[0f32, 1.0, 0.0], [0.0, 0.0, 1.0]], &Device::Cpu)?;
        let mut rng = SmallRng::seed_from_u64(42);

        for _ in 0..10 {
            assert_eq!(sample_actions(&policy, &mut rng)?, vec![1, 2]);
        }
        Ok(())
    }

    #[test]
    fn test_sample_frequencies() -> Result<()> {
        let policy = Tensor::new(&[[0.2f32, 0.8]], &Device::Cpu)?;
        let mut rng = SmallRng::seed_from_u64(7);
        let n = 5000;
        let ones: u32 = (0..n)
            .map(|_| sample_actions(&policy, &mut rng).map(|a| a[0]))
            .sum::<Result<u32>>()?;
        let freq = ones as f32 / n as f32;
        assert!((freq - 0.8).abs() < 0.05, "frequency of action 1: {}", freq);
        Ok(())
    }

    #[test]
    fn test_invalid_policy() -> Result<()> {
        let policy = Tensor::new(&[[0f32, 0.0]], &Device::Cpu)?;
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(sample_actions(&policy, &mut rng).is_err());
        Ok(())
    }

    #[test]
    fn test_log_policy_of_actions() -> Result<()> {
        let log_policy = Tensor::new(&[[-0.1f32, -2.0], [-3.0, -0.05]], &Device::Cpu)?;
        let selected = log_policy_of_actions(&log_policy, &[1, 0])?.to_vec1::<f32>()?;
        assert_eq!(selected, vec![-2.0, -3.0]);
        Ok(())
    }

    #[test]
    fn test_entropy() -> Result<()> {
        let policy = Tensor::new(&[[0.5f32, 0.5], [1.0, 0.0]], &Device::Cpu)?;
        let log_policy = Tensor::new(&[[0.5f32.ln(), 0.5f32.ln()], [0.0, -1e4]], &Device::Cpu)?;
        let h = entropy(&policy, &log_policy)?.to_vec1::<f32>()?;
        assert!((h[0] - 2f32.ln()).abs() < 1e-6);
        assert_eq!(h[1], 0.0);
        Ok(())
    }
}
