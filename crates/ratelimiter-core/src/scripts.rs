//! The two atomic scripts (spec §4.5), composed from shared fragments.
//!
//! This module only holds the Lua source; nothing here executes it —
//! that's the store's job (via [`crate::store::StoreClient`]). The
//! in-process [`crate::memory::InMemoryStore`] recognizes these exact
//! bodies and runs the equivalent logic from [`crate::algorithm`]
//! instead of an embedded Lua interpreter.

/// Name under which the check-only script is registered in a
/// [`crate::script_cache::ScriptCache`].
pub const CHECK_RATE_LIMIT: &str = "check_rate_limit";

/// Name under which the check-and-increment script is registered.
pub const CHECK_LIMIT_INCR: &str = "check_limit_incr";

/// Parses `ARGV[1]` (rules JSON) and `ARGV[2..5]`, and defines
/// `expired_bucket_fields`, reused by both the check and the
/// check-and-increment fragments.
const UNPACK_ARGS: &str = r#"
local rules = cjson.decode(ARGV[1])
local now = tonumber(ARGV[2])
local weight = tonumber(ARGV[3])
local whitelist_key = ARGV[4]
local blacklist_key = ARGV[5]

for _, rule in ipairs(rules) do
    local interval = rule[1]
    local limit = rule[2]
    local precision = rule[3]
    if precision == nil or precision > interval then
        precision = interval
    end
    rule.interval = interval
    rule.limit = limit
    rule.precision = precision
    rule.prefix = tostring(interval) .. ':' .. tostring(precision) .. ':'
    rule.now_bucket = math.floor(now / precision)
    rule.window_start_bucket = math.floor((now - interval) / precision)
end

-- Returns the list of expired bucket field names for `key`/`rule` and
-- the sum of their stored weight. Read-only: issues no writes.
local function expired_bucket_fields(key, rule)
    local fields = {}
    local sum = 0
    for _, field in ipairs(redis.call('HKEYS', key)) do
        if field ~= rule.prefix and field:sub(1, #rule.prefix) == rule.prefix then
            local idx = tonumber(field:sub(#rule.prefix + 1))
            if idx and idx < rule.window_start_bucket then
                sum = sum + (tonumber(redis.call('HGET', key, field)) or 0)
                table.insert(fields, field)
            end
        end
    end
    return fields, sum
end
"#;

/// Whitelist beats blacklist, checked per key.
const CHECK_WHITELIST_BLACKLIST: &str = r#"
for _, key in ipairs(KEYS) do
    if redis.call('SISMEMBER', whitelist_key, key) == 1 then
        return 0
    end
    if redis.call('SISMEMBER', blacklist_key, key) == 1 then
        return 2
    end
end
"#;

/// Read-only: denies if any (key, rule) pair is already at or over its
/// limit. Never writes.
const CHECK_LIMIT: &str = r#"
for _, key in ipairs(KEYS) do
    for _, rule in ipairs(rules) do
        local count = tonumber(redis.call('HGET', key, rule.prefix)) or 0
        local _, expired = expired_bucket_fields(key, rule)
        local effective = count - expired
        if effective < 0 then effective = 0 end
        if effective >= rule.limit then
            return 1
        end
    end
end
"#;

/// Runs only once `check_limit` above did not deny. Two-phase: first
/// re-checks every (key, rule) pair against the weight with no writes
/// at all; only once every pair passes does it commit the increments,
/// so a denial anywhere leaves every key's counters untouched.
const CHECK_INCR_LIMIT: &str = r#"
local plan = {}
for _, key in ipairs(KEYS) do
    for _, rule in ipairs(rules) do
        local count = tonumber(redis.call('HGET', key, rule.prefix)) or 0
        local expired_fields, expired = expired_bucket_fields(key, rule)
        local new_count = count - expired
        if new_count < 0 then new_count = 0 end
        if new_count + weight > rule.limit then
            return 1
        end
        table.insert(plan, { key = key, rule = rule, expired_fields = expired_fields, expired = expired })
    end
end

for _, step in ipairs(plan) do
    for _, field in ipairs(step.expired_fields) do
        redis.call('HDEL', step.key, field)
    end
    local current_bucket_field = step.rule.prefix .. tostring(step.rule.now_bucket)
    redis.call('HINCRBY', step.key, current_bucket_field, weight)
    redis.call('HINCRBY', step.key, step.rule.prefix, weight - step.expired)
end

local max_interval = 0
for _, rule in ipairs(rules) do
    if rule.interval > max_interval then
        max_interval = rule.interval
    end
end
for _, key in ipairs(KEYS) do
    redis.call('EXPIRE', key, max_interval)
end

return 0
"#;

/// `check_rate_limit` = unpack_args; check_whitelist_blacklist; check_limit; return 0.
pub fn check_rate_limit_body() -> String {
    format!("{UNPACK_ARGS}{CHECK_WHITELIST_BLACKLIST}{CHECK_LIMIT}\nreturn 0\n")
}

/// `check_limit_incr` = unpack_args; check_whitelist_blacklist; check_limit; check_incr_limit.
pub fn check_limit_incr_body() -> String {
    format!("{UNPACK_ARGS}{CHECK_WHITELIST_BLACKLIST}{CHECK_LIMIT}{CHECK_INCR_LIMIT}")
}

/// `(name, body)` pairs for every registered script, ready to hand to
/// [`crate::script_cache::ScriptCache::new`].
pub fn bodies() -> Vec<(&'static str, String)> {
    vec![
        (CHECK_RATE_LIMIT, check_rate_limit_body()),
        (CHECK_LIMIT_INCR, check_limit_incr_body()),
    ]
}

/// Whether `body` is (textually) the check-and-increment script, as
/// opposed to the check-only one. Used only by the in-process store to
/// dispatch to the matching pure-Rust algorithm — a real store never
/// needs this, it just runs the Lua.
pub fn is_incr_body(body: &str) -> bool {
    body.contains("HINCRBY")
}
