use serde::Serialize;

/// Medal decoration for the top three positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    pub const fn for_rank(rank: usize) -> Option<Self> {
        match rank {
            1 => Some(Self::Gold),
            2 => Some(Self::Silver),
            3 => Some(Self::Bronze),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Gold => "🥇",
            Self::Silver => "🥈",
            Self::Bronze => "🥉",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked<T> {
    pub rank: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medal: Option<Medal>,
    pub score: u64,
    #[serde(flatten)]
    pub row: T,
}

impl<T> Ranked<T> {
    /// `"🥇 1st"` for medal positions, plain ordinal otherwise.
    pub fn rank_label(&self) -> String {
        match self.medal {
            Some(medal) => format!("{} {}", medal.label(), ordinal(self.rank)),
            None => ordinal(self.rank),
        }
    }
}

/// Row-number ranking: rows are stably sorted by score descending and numbered
/// 1..=N by position. Equal scores receive consecutive numbers in input order.
pub fn rank<T, F>(rows: Vec<T>, score: F) -> Vec<Ranked<T>>
where
    F: Fn(&T) -> u64,
{
    let mut scored: Vec<(u64, T)> = rows.into_iter().map(|row| (score(&row), row)).collect();
    scored.sort_by(|(left, _), (right, _)| right.cmp(left));

    scored
        .into_iter()
        .enumerate()
        .map(|(position, (score, row))| {
            let rank = position + 1;
            Ranked {
                rank,
                medal: Medal::for_rank(rank),
                score,
                row,
            }
        })
        .collect()
}

pub fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ties_get_distinct_ranks_in_input_order() {
        let rows = vec![("A", 120), ("B", 120), ("C", 90)];
        let ranked = rank(rows, |(_, score)| *score);
        let view: Vec<(&str, usize)> = ranked.iter().map(|r| (r.row.0, r.rank)).collect();
        assert_eq!(view, vec![("A", 1), ("B", 2), ("C", 3)]);
    }

    #[test]
    fn sorts_by_score_descending() {
        let ranked = rank(vec![("low", 5), ("high", 50), ("mid", 20)], |(_, s)| *s);
        let names: Vec<&str> = ranked.iter().map(|r| r.row.0).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[test]
    fn ranks_are_a_permutation_of_one_to_n() {
        for rows in [
            vec![7u64; 6],
            vec![1, 2, 3, 4, 5],
            vec![3, 1, 3, 1, 3, 0, 9],
            Vec::new(),
        ] {
            let n = rows.len();
            let ranked = rank(rows, |score| *score);
            let ranks: BTreeSet<usize> = ranked.iter().map(|r| r.rank).collect();
            assert_eq!(ranks, (1..=n).collect::<BTreeSet<_>>());
        }
    }

    #[test]
    fn medals_only_for_top_three() {
        let ranked = rank(vec![4u64, 3, 2, 1], |score| *score);
        let labels: Vec<String> = ranked.iter().map(Ranked::rank_label).collect();
        assert_eq!(labels, vec!["🥇 1st", "🥈 2nd", "🥉 3rd", "4th"]);
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(102), "102nd");
        assert_eq!(ordinal(113), "113th");
    }
}
