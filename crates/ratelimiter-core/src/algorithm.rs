//! Pure-Rust mirror of the bucket accounting the Lua scripts in
//! [`crate::scripts`] perform on the store. Used by
//! [`crate::memory::InMemoryStore`] and directly by
//! `ratelimiter-proptests` — nothing here talks to a store, so it is
//! cheap to fuzz for the invariants in spec.md §8.
//!
//! This is intentionally the *bucketed approximation* spec.md
//! mandates, not a true sliding log: do not "improve" it.

use std::collections::HashMap;

use crate::rules::Rule;

/// One identifier's counter hash: field name to stored integer.
pub type CounterState = HashMap<String, i64>;

fn floor_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

/// Sum of weight in buckets that have aged out of the window, and the
/// effective (non-expired) count, for one `(key-state, rule)` pair at
/// time `now`. Read-only.
fn expired_and_effective(rule: &Rule, now: u64, state: &CounterState) -> (i64, i64) {
    let precision = rule.effective_precision() as i64;
    let interval = rule.interval() as i64;
    let window_start_bucket = floor_div(now as i64 - interval, precision);
    let prefix = rule.count_field();

    let count = *state.get(&prefix).unwrap_or(&0);
    let mut expired = 0i64;
    for (field, value) in state.iter() {
        if field != &prefix && field.starts_with(&prefix) {
            if let Ok(idx) = field[prefix.len()..].parse::<i64>() {
                if idx < window_start_bucket {
                    expired += value;
                }
            }
        }
    }
    let effective = (count - expired).max(0);
    (expired, effective)
}

/// The effective (non-expired) weight for one `(key, rule)` pair. This
/// is what [`crate::limiter::RateLimiter::violated_rules`] would read
/// if it ran the full check rather than a single hash-field read.
pub fn effective_count(rule: &Rule, now: u64, state: &CounterState) -> i64 {
    expired_and_effective(rule, now, state).1
}

/// `check_limit`: true iff any rule is already at or over its limit.
/// Never mutates `state`.
pub fn check_only(rules: &[Rule], now: u64, state: &CounterState) -> bool {
    rules
        .iter()
        .any(|rule| effective_count(rule, now, state) >= rule.limit() as i64)
}

/// `check_incr_limit` for a single identifier: denies (and leaves
/// `state` untouched) if `check_only` already denies, or if adding
/// `weight` to any rule's post-expiry count would exceed its limit.
/// Otherwise commits every rule's bucket/count increment and returns
/// `false`.
pub fn check_and_incr(rules: &[Rule], now: u64, weight: u64, state: &mut CounterState) -> bool {
    if check_only(rules, now, state) {
        return true;
    }

    struct Plan {
        prefix: String,
        now_bucket: i64,
        expired_sum: i64,
        expired_fields: Vec<String>,
    }

    let mut plans = Vec::with_capacity(rules.len());
    for rule in rules {
        let precision = rule.effective_precision() as i64;
        let now_bucket = floor_div(now as i64, precision);
        let (expired_sum, _) = expired_and_effective(rule, now, state);
        let prefix = rule.count_field();
        let count = *state.get(&prefix).unwrap_or(&0);
        let new_count = (count - expired_sum).max(0);
        if new_count + weight as i64 > rule.limit() as i64 {
            return true;
        }

        let expired_fields = state
            .keys()
            .filter(|field| {
                *field != &prefix
                    && field.starts_with(&prefix)
                    && field[prefix.len()..]
                        .parse::<i64>()
                        .map(|idx| idx < floor_div(now as i64 - rule.interval() as i64, precision))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();

        plans.push(Plan {
            prefix,
            now_bucket,
            expired_sum,
            expired_fields,
        });
    }

    for plan in plans {
        for field in &plan.expired_fields {
            state.remove(field);
        }
        let bucket_field = format!("{}{}", plan.prefix, plan.now_bucket);
        *state.entry(bucket_field).or_insert(0) += weight as i64;
        *state.entry(plan.prefix).or_insert(0) += weight as i64 - plan.expired_sum;
    }

    false
}

/// Multi-identifier `check_limit`: denies iff any key denies.
pub fn check_only_multi(
    rules: &[Rule],
    now: u64,
    states: &HashMap<String, CounterState>,
    keys: &[String],
) -> bool {
    let empty = CounterState::new();
    keys.iter()
        .any(|key| check_only(rules, now, states.get(key).unwrap_or(&empty)))
}

/// Multi-identifier `check_incr_limit`: all-or-nothing across every
/// key. Mutations are staged on clones of each key's state and only
/// committed back to `states` once every key passes.
pub fn check_and_incr_multi(
    rules: &[Rule],
    now: u64,
    weight: u64,
    states: &mut HashMap<String, CounterState>,
    keys: &[String],
) -> bool {
    let mut staged = Vec::with_capacity(keys.len());
    for key in keys {
        let mut state = states.get(key).cloned().unwrap_or_default();
        if check_and_incr(rules, now, weight, &mut state) {
            return true;
        }
        staged.push((key.clone(), state));
    }
    for (key, state) in staged {
        states.insert(key, state);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    fn rule(interval: u64, limit: u64) -> Rule {
        Rule::new(interval, limit, None).unwrap()
    }

    #[test]
    fn basic_limit_allows_five_then_denies() {
        let rules = vec![rule(1, 5)];
        let mut state = CounterState::new();
        let mut results = Vec::new();
        for _ in 0..10 {
            results.push(check_and_incr(&rules, 0, 1, &mut state));
        }
        assert_eq!(
            results,
            vec![false, false, false, false, false, true, true, true, true, true]
        );
    }

    // See DESIGN.md's "Open Question resolved — window rollover timing
    // vs. spec.md §8 scenario 2" entry: the literal §4.5 formula does
    // not clear bucket 0 until `now` reaches 2, one full interval after
    // the bucket was written, not at T=1.1 as scenario 2's prose states.
    // This test asserts what the mandated formula actually does at each
    // truncated-to-seconds checkpoint, including the T=1 case where it
    // disagrees with the scenario text.
    #[test]
    fn window_rollover_frees_the_bucket() {
        let rules = vec![rule(1, 5)];
        let mut state = CounterState::new();
        for _ in 0..5 {
            assert!(!check_and_incr(&rules, 0, 1, &mut state));
        }
        assert!(check_and_incr(&rules, 0, 1, &mut state), "6th at T=0 denies");
        assert!(check_and_incr(&rules, 0, 1, &mut state), "still within bucket 0 at T=0.5 (floor)");
        assert!(
            check_and_incr(&rules, 1, 1, &mut state),
            "T=1.1 floors to now=1: window_start_bucket = floor((1-1)/1) = 0, \
             bucket 0 is not yet < 0, so it has not expired and this still denies \
             (spec.md §8 scenario 2 says T=1.1 should allow; see DESIGN.md)"
        );
        assert!(!check_and_incr(&rules, 2, 1, &mut state), "T=2 has rolled past the window");
    }

    #[test]
    fn weighted_denial_leaves_state_unchanged() {
        let rules = vec![rule(10, 10)];
        let mut state = CounterState::new();
        assert!(!check_and_incr(&rules, 0, 7, &mut state));
        let snapshot = state.clone();
        assert!(check_and_incr(&rules, 1, 4, &mut state), "7 + 4 > 10");
        assert_eq!(state, snapshot, "denied incr must not mutate counters");
        assert!(!check_and_incr(&rules, 1, 3, &mut state), "7 + 3 == 10 is allowed");
    }

    #[test]
    fn precision_clamp_behaves_like_explicit_matching_precision() {
        let clamped = vec![Rule::new(10, 5, Some(100)).unwrap()];
        let explicit = vec![Rule::new(10, 5, Some(10)).unwrap()];
        let mut state_a = CounterState::new();
        let mut state_b = CounterState::new();
        for t in [0, 1, 2, 11] {
            let a = check_and_incr(&clamped, t, 1, &mut state_a);
            let b = check_and_incr(&explicit, t, 1, &mut state_b);
            assert_eq!(a, b, "clamped and explicit precision must behave identically at t={t}");
        }
    }

    #[test]
    fn check_only_never_mutates() {
        let rules = vec![rule(1, 5)];
        let mut state = CounterState::new();
        for _ in 0..20 {
            check_only(&rules, 0, &state);
        }
        assert!(state.is_empty());
    }

    #[test]
    fn multi_key_incr_is_all_or_nothing() {
        let rules = vec![rule(10, 5)];
        let mut states: HashMap<String, CounterState> = HashMap::new();
        // Exhaust "b" first.
        let mut exhausted = CounterState::new();
        for _ in 0..5 {
            assert!(!check_and_incr(&rules, 0, 1, &mut exhausted));
        }
        states.insert("b".to_string(), exhausted);

        let keys = vec!["a".to_string(), "b".to_string()];
        let denied = check_and_incr_multi(&rules, 0, 1, &mut states, &keys);
        assert!(denied);
        assert!(
            states.get("a").map(|s| s.is_empty()).unwrap_or(true),
            "key 'a' must be untouched when the multi-key call denies"
        );
    }
}
