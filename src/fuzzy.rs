/// Case-insensitive subsequence score. `None` when the query is not a
/// subsequence of the candidate; any match scores at least 1, so every
/// returned score is positive for a non-empty query. Consecutive runs and
/// matches right after a separator are worth more, which floats compact
/// matches and path-segment starts to the top.
pub fn score(query: &str, candidate: &str) -> Option<i64> {
    if query.is_empty() {
        return Some(0);
    }
    let query = query.to_lowercase();
    let candidate = candidate.to_lowercase();

    let mut query_chars = query.chars();
    let mut wanted = query_chars.next();
    let mut total: i64 = 0;
    let mut prev_matched = false;
    let mut prev_char: Option<char> = None;

    for c in candidate.chars() {
        match wanted {
            Some(q) if q == c => {
                let mut gained = 1;
                if prev_matched {
                    gained += 4;
                }
                if prev_char.is_none_or(is_separator) {
                    gained += 2;
                }
                total += gained;
                wanted = query_chars.next();
                prev_matched = true;
            }
            Some(_) => {
                prev_matched = false;
            }
            None => break,
        }
        prev_char = Some(c);
    }

    if wanted.is_none() { Some(total) } else { None }
}

fn is_separator(c: char) -> bool {
    matches!(c, '/' | '-' | '_' | '.' | ' ')
}

/// Rank `items` against `query` by the name `name` extracts. An empty query
/// returns the list untouched (same order, same set); otherwise only
/// matching items survive, best score first, ties in input order.
pub fn rank<T, F>(query: &str, items: Vec<T>, name: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if query.is_empty() {
        return items;
    }
    let mut scored: Vec<(i64, T)> = items
        .into_iter()
        .filter_map(|item| score(query, name(&item)).map(|s| (s, item)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str], query: &str) -> Vec<String> {
        let owned: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        rank(query, owned, |s| s.as_str())
    }

    #[test]
    fn test_empty_query_is_identity() {
        let input = vec!["zeta", "alpha", "zeta", "mid"];
        let ranked = names(&input, "");
        assert_eq!(ranked, vec!["zeta", "alpha", "zeta", "mid"]);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let input: Vec<String> = ["report.pdf", "notes.txt", "deploy.sh", "readme.md"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let once = rank("re", input.clone(), |s| s.as_str());
        let twice = rank("re", once.clone(), |s| s.as_str());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_subsequence_is_dropped() {
        assert_eq!(score("xyz", "report.pdf"), None);
        let ranked = names(&["report.pdf", "xylophone"], "xy");
        assert_eq!(ranked, vec!["xylophone"]);
    }

    #[test]
    fn test_case_insensitive() {
        assert!(score("readme", "README.md").is_some());
        assert!(score("RPT", "report.pdf").is_some());
    }

    #[test]
    fn test_all_matches_score_positive() {
        for candidate in ["log.txt", "catalog", "l-o-g"] {
            let s = score("log", candidate).unwrap();
            assert!(s > 0, "{candidate} scored {s}");
        }
    }

    #[test]
    fn test_consecutive_run_ranks_higher() {
        let ranked = names(&["catalog.txt", "log.txt"], "log");
        assert_eq!(ranked[0], "log.txt");
    }

    #[test]
    fn test_separator_start_ranks_higher() {
        let ranked = names(&["download.c", "my-docs.txt"], "doc");
        assert_eq!(ranked[0], "my-docs.txt");
    }

    #[test]
    fn test_ties_keep_input_order() {
        let ranked = names(&["data1.csv", "data2.csv"], "data");
        assert_eq!(ranked, vec!["data1.csv", "data2.csv"]);
    }
}
