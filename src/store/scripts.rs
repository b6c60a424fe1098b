/// Lua script for the shared store's atomic increment+conditional-expire.
///
/// A plain INCR-then-EXPIRE from the client would race: two concurrent
/// callers could both see count == 1 and both (re)arm the expiry, or a
/// failure between the two commands would leave an immortal counter.
/// Running both steps inside one script makes them indivisible.
///
/// KEYS[1] = the bucket key
/// ARGV[1] = window length in milliseconds
///
/// Returns: [count, remaining ttl in milliseconds]
pub const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])

-- Arm the expiry only on the call that created the counter
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end

local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    -- Counter exists without an expiry (e.g. restored from a dump);
    -- repair it so the bucket cannot live forever
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end

return {count, ttl}
"#;
