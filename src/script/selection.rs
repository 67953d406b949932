/// 가중치 기반 스텝 선택
/// 가중치 → 누적 분포 → 난수 값으로 인덱스 결정 (같은 시드면 같은 순서)
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("a weighted script needs at least one step")]
    Empty,
    #[error("step `{0}` has a zero weight")]
    ZeroWeight(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedTable {
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightedTable {
    pub fn new(weights: &[(&str, u32)]) -> Result<Self, SelectionError> {
        if weights.is_empty() {
            return Err(SelectionError::Empty);
        }
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0u64;
        for (name, weight) in weights {
            if *weight == 0 {
                return Err(SelectionError::ZeroWeight(name.to_string()));
            }
            total += u64::from(*weight);
            cumulative.push(total);
        }
        Ok(Self { cumulative, total })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// roll 은 [0, total) 범위로 접힌다
    pub fn pick(&self, roll: u64) -> usize {
        let roll = roll % self.total;
        self.cumulative.partition_point(|&bound| bound <= roll)
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.pick(rng.gen_range(0..self.total))
    }
}

/// 인스턴스별 난수 생성기 (실행 시드 + 인스턴스 번호)
pub fn instance_rng(run_seed: u64, instance_id: u64) -> StdRng {
    StdRng::seed_from_u64(run_seed ^ instance_id.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}
