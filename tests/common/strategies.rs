use proptest::prelude::*;
use std::collections::HashMap;

use runbook_agent::Event;

/// Printable text including quotes, backslashes and non-ASCII
pub fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _./\"\\\\:é漢-]{0,40}"
}

pub fn environment_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("[A-Z_]{1,12}", text_strategy(), 0..5)
}

/// Events with arbitrary wire fields and empty transport fields
pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        (
            any::<i64>(),
            text_strategy(),
            text_strategy(),
            text_strategy(),
            text_strategy(),
            "[0-9]{1,12}",
            text_strategy(),
        ),
        (
            text_strategy(),
            text_strategy(),
            text_strategy(),
            text_strategy(),
            any::<i32>(),
            text_strategy(),
            environment_strategy(),
        ),
    )
        .prop_map(
            |(
                (timestamp, source, hostname, action_type, event_id, agent_id, rule_id),
                (
                    inflight_action_id,
                    runbook_name,
                    raw_command,
                    signature,
                    timeout,
                    github_file_path,
                    environment,
                ),
            )| Event {
                timestamp,
                source,
                hostname,
                action_type,
                event_id,
                agent_id,
                rule_id,
                inflight_action_id,
                runbook_name,
                raw_command,
                signature,
                timeout,
                github_file_path,
                environment,
                ..Default::default()
            },
        )
}
