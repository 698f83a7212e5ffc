//! Splitting a department's students into work groups.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub student_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Balanced,
    Random,
}

impl Strategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Some(Self::Balanced),
            "random" => Some(Self::Random),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Random => "random",
        }
    }

    pub fn reasoning(self) -> &'static str {
        match self {
            Self::Balanced => {
                "تم توزيع التلاميذ على الأفواج بالتناوب بين ذوي الأداء المرتفع والمنخفض لتحقيق التوازن بين الأفواج."
            }
            Self::Random => "تم توزيع التلاميذ على الأفواج عشوائياً.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingError {
    TooFewGroups,
    InsufficientStudents { students: usize, groups: usize },
}

/// Returns `groups` buckets of student ids. Every candidate lands in exactly
/// one bucket and bucket `i % groups` receives the i-th pick.
pub fn divide(
    candidates: &[Candidate],
    groups: usize,
    strategy: Strategy,
    seed: Option<u64>,
) -> Result<Vec<Vec<String>>, GroupingError> {
    if groups < 2 {
        return Err(GroupingError::TooFewGroups);
    }
    if candidates.len() < groups {
        return Err(GroupingError::InsufficientStudents {
            students: candidates.len(),
            groups,
        });
    }
    let order = match strategy {
        Strategy::Balanced => balanced_order(candidates),
        Strategy::Random => {
            let mut ids: Vec<String> = candidates.iter().map(|c| c.student_id.clone()).collect();
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };
            ids.shuffle(&mut rng);
            ids
        }
    };

    let mut out: Vec<Vec<String>> = vec![Vec::new(); groups];
    for (i, id) in order.into_iter().enumerate() {
        out[i % groups].push(id);
    }
    Ok(out)
}

/// Even picks come from the at-or-above-mean list while it lasts, odd picks
/// from the below-mean list; whichever list remains fills the rest.
fn balanced_order(candidates: &[Candidate]) -> Vec<String> {
    let mean = candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64;
    let high: Vec<&Candidate> = candidates.iter().filter(|c| c.score >= mean).collect();
    let low: Vec<&Candidate> = candidates.iter().filter(|c| c.score < mean).collect();

    let mut hi = 0usize;
    let mut lo = 0usize;
    let mut order = Vec::with_capacity(candidates.len());
    for i in 0..candidates.len() {
        if i % 2 == 0 && hi < high.len() {
            order.push(high[hi].student_id.clone());
            hi += 1;
        } else if lo < low.len() {
            order.push(low[lo].student_id.clone());
            lo += 1;
        } else if hi < high.len() {
            order.push(high[hi].student_id.clone());
            hi += 1;
        }
    }
    order
}
