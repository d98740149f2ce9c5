//! Transfer strategy selection and part planning

use crate::config::TransferConfig;
use crate::error::TransferError;

/// Maximum number of parts a multipart upload may have
pub const MAX_PARTS: u64 = 10_000;

/// How a payload of a given size is uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// One put request carrying the whole payload
    SingleShot,
    /// Sequential multipart upload
    Multipart(PartPlan),
}

impl TransferStrategy {
    /// Pick single-shot or multipart for a payload of `size` bytes.
    ///
    /// Sizes strictly above the threshold go multipart.
    pub fn select(size: u64, config: &TransferConfig) -> Result<Self, TransferError> {
        if size > config.multipart_threshold {
            Ok(TransferStrategy::Multipart(PartPlan::new(size, config.chunk_size)?))
        } else {
            Ok(TransferStrategy::SingleShot)
        }
    }
}

/// Byte range of one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number
    pub part_number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Split of a payload into contiguous parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub total_size: u64,
    pub part_size: u64,
    pub part_count: u64,
}

impl PartPlan {
    pub fn new(total_size: u64, part_size: u64) -> Result<Self, TransferError> {
        if part_size == 0 {
            return Err(TransferError::Configuration(
                "part size must be greater than zero".to_string(),
            ));
        }

        let part_count = total_size.div_ceil(part_size);
        if part_count > MAX_PARTS {
            return Err(TransferError::Input(format!(
                "payload of {} bytes needs {} parts of {} bytes; the limit is {}",
                total_size, part_count, part_size, MAX_PARTS
            )));
        }

        Ok(Self {
            total_size,
            part_size,
            part_count,
        })
    }

    /// Parts in ascending order, numbered from 1 with no gaps
    pub fn parts(&self) -> impl Iterator<Item = PartRange> + '_ {
        (0..self.part_count).map(move |index| {
            let offset = index * self.part_size;
            let len = self.part_size.min(self.total_size - offset);
            PartRange {
                part_number: (index + 1) as i32,
                offset,
                len,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_select_single_shot_at_threshold() {
        let config = TransferConfig::default();
        assert_eq!(
            TransferStrategy::select(5 * MIB, &config).unwrap(),
            TransferStrategy::SingleShot
        );
        assert_eq!(
            TransferStrategy::select(15 * MIB, &config).unwrap(),
            TransferStrategy::SingleShot
        );
        assert_eq!(
            TransferStrategy::select(0, &config).unwrap(),
            TransferStrategy::SingleShot
        );
    }

    #[test]
    fn test_select_multipart_above_threshold() {
        let config = TransferConfig::default();
        match TransferStrategy::select(15 * MIB + 1, &config).unwrap() {
            TransferStrategy::Multipart(plan) => {
                assert_eq!(plan.part_count, 2);
                assert_eq!(plan.part_size, 10 * MIB);
            }
            other => panic!("expected multipart, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_25_mib() {
        let plan = PartPlan::new(25 * MIB, 10 * MIB).unwrap();
        let parts: Vec<PartRange> = plan.parts().collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts.iter().map(|p| p.len).collect::<Vec<_>>(),
            vec![10 * MIB, 10 * MIB, 5 * MIB]
        );
        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(parts[2].offset, 20 * MIB);
    }

    #[test]
    fn test_plan_invariants_across_sizes() {
        let part_size = 7;
        for total in 1..200u64 {
            let plan = PartPlan::new(total, part_size).unwrap();
            let parts: Vec<PartRange> = plan.parts().collect();

            assert_eq!(parts.len() as u64, total.div_ceil(part_size));
            assert_eq!(parts.iter().map(|p| p.len).sum::<u64>(), total);

            let mut expected_offset = 0;
            for (i, part) in parts.iter().enumerate() {
                assert_eq!(part.part_number, i as i32 + 1);
                assert_eq!(part.offset, expected_offset);
                if i + 1 < parts.len() {
                    assert_eq!(part.len, part_size);
                } else {
                    assert_eq!(part.len, total - (parts.len() as u64 - 1) * part_size);
                }
                expected_offset += part.len;
            }
        }
    }

    #[test]
    fn test_plan_exact_multiple() {
        let plan = PartPlan::new(20 * MIB, 10 * MIB).unwrap();
        let lens: Vec<u64> = plan.parts().map(|p| p.len).collect();
        assert_eq!(lens, vec![10 * MIB, 10 * MIB]);
    }

    #[test]
    fn test_plan_too_many_parts() {
        assert!(matches!(
            PartPlan::new(MAX_PARTS + 1, 1),
            Err(TransferError::Input(_))
        ));
        assert!(PartPlan::new(MAX_PARTS, 1).is_ok());
    }

    #[test]
    fn test_plan_zero_part_size() {
        assert!(matches!(
            PartPlan::new(10, 0),
            Err(TransferError::Configuration(_))
        ));
    }
}
