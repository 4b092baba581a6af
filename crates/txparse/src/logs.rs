//! Program log scanning and Anchor event payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::tx_facts::{RawInstruction, TxFacts};

/// Prefix of Anchor `emit!` payload lines.
pub const PROGRAM_DATA: &str = "Program data: ";

/// Prefix of Raydium AMM v4 swap logs.
pub const RAY_LOG: &str = "Program log: ray_log: ";

/// Collect `marker` lines emitted while `program_id` is executing, in order.
///
/// The runtime brackets every call with `Program <id> invoke [n]` and
/// `Program <id> success` (or `... failed: ...`), so an explicit call stack
/// tells which program emitted each line.
pub fn scan_program_logs(lines: &[String], program_id: &str, marker: &str) -> Vec<String> {
    let mut stack: Vec<&str> = Vec::new();
    let mut out = Vec::new();

    for line in lines {
        if let Some(program) = call_entry(line) {
            stack.push(program);
            continue;
        }

        if let Some(program) = call_exit(line) {
            if stack.last() == Some(&program) {
                stack.pop();
            }
            continue;
        }

        if stack.last() == Some(&program_id) {
            if let Some(payload) = line.strip_prefix(marker) {
                out.push(payload.to_string());
            }
        }
    }

    out
}

/// `Program <id> <verb> ...` as written by the runtime. Program-emitted
/// lines (`Program log:`, `Program data:`, `Program return:`) never match.
fn runtime_line(line: &str) -> Option<(&str, &str)> {
    let mut words = line.strip_prefix("Program ")?.split(' ');
    let program = words.next().filter(|p| !p.is_empty() && !p.ends_with(':'))?;
    Some((program, words.next()?))
}

fn call_entry(line: &str) -> Option<&str> {
    runtime_line(line).and_then(|(program, verb)| (verb == "invoke").then_some(program))
}

fn call_exit(line: &str) -> Option<&str> {
    runtime_line(line)
        .and_then(|(program, verb)| (verb == "success" || verb == "failed:").then_some(program))
}

/// First 8 bytes of `sha256(name)`, e.g. `event_discriminator("event:TradeEvent")`.
pub fn event_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(name.as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Anchor `emit_cpi!` events: self-invocations of `program_id` whose data
/// starts with the `anchor:event` tag, split into discriminator and body.
pub fn cpi_events(instructions: &[RawInstruction], program_id: &str) -> Vec<([u8; 8], Vec<u8>)> {
    let tag = event_discriminator("anchor:event");

    instructions
        .iter()
        .filter(|ix| ix.program_id == program_id && ix.outer_ix_index.is_some())
        .filter(|ix| ix.data.len() >= 16 && ix.data[..8] == tag)
        .map(|ix| {
            let mut disc = [0u8; 8];
            disc.copy_from_slice(&ix.data[8..16]);
            (disc, ix.data[16..].to_vec())
        })
        .collect()
}

/// Events emitted by `program_id`, in execution order: self-CPI events when
/// the program emits any, else its `Program data:` log lines.
pub fn program_events(facts: &TxFacts, program_id: &str) -> Vec<([u8; 8], Vec<u8>)> {
    let from_cpi = cpi_events(&facts.instructions, program_id);
    if !from_cpi.is_empty() {
        return from_cpi;
    }

    scan_program_logs(&facts.logs, program_id, PROGRAM_DATA)
        .iter()
        .filter_map(|payload| split_event(payload))
        .collect()
}

/// Base64-decode an event payload and split off its discriminator.
///
/// Invalid base64 and payloads shorter than a discriminator yield `None`.
pub fn split_event(payload: &str) -> Option<([u8; 8], Vec<u8>)> {
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    if bytes.len() < 8 {
        return None;
    }
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&bytes[..8]);
    Some((disc, bytes[8..].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scan_only_collects_target_frame() {
        let logs = lines(&[
            "Program Outer111 invoke [1]",
            "Program data: outer-payload",
            "Program Target111 invoke [2]",
            "Program log: Instruction: Buy",
            "Program data: target-1",
            "Program Token111 invoke [3]",
            "Program data: token-payload",
            "Program Token111 success",
            "Program data: target-2",
            "Program Target111 success",
            "Program data: outer-again",
            "Program Outer111 success",
        ]);

        assert_eq!(
            scan_program_logs(&logs, "Target111", PROGRAM_DATA),
            vec!["target-1", "target-2"]
        );
        assert_eq!(
            scan_program_logs(&logs, "Outer111", PROGRAM_DATA),
            vec!["outer-payload", "outer-again"]
        );
    }

    #[test]
    fn test_failed_inner_call_pops_stack() {
        let logs = lines(&[
            "Program Target111 invoke [1]",
            "Program Inner111 invoke [2]",
            "Program Inner111 failed: custom program error: 0x1",
            "Program log: ray_log: AwAAAA==",
            "Program Target111 success",
        ]);

        assert_eq!(scan_program_logs(&logs, "Target111", RAY_LOG), vec!["AwAAAA=="]);
    }

    #[test]
    fn test_scan_ignores_other_markers() {
        let logs = lines(&[
            "Program Target111 invoke [1]",
            "Program log: hello",
            "Program data: x",
            "Program Target111 success",
        ]);
        assert_eq!(scan_program_logs(&logs, "Target111", RAY_LOG), Vec::<String>::new());
    }

    #[test]
    fn test_only_runtime_lines_enter_frames() {
        let logs = lines(&[
            "Program Target111 invoke [1]",
            "Program log: about to invoke the pool",
            "Program data: first",
            "Program Target111 success",
        ]);
        assert_eq!(scan_program_logs(&logs, "Target111", PROGRAM_DATA), vec!["first"]);
    }

    #[test]
    fn test_program_log_text_does_not_close_frames() {
        let logs = lines(&[
            "Program Outer111 invoke [1]",
            "Program Target111 invoke [2]",
            "Program log: failed to find preferred route, using fallback",
            "Program log: success",
            "Program data: target-payload",
            "Program Target111 success",
            "Program Outer111 success",
        ]);
        assert_eq!(
            scan_program_logs(&logs, "Target111", PROGRAM_DATA),
            vec!["target-payload"]
        );
    }

    #[test]
    fn test_mismatched_exit_keeps_frame() {
        let logs = lines(&[
            "Program Target111 invoke [1]",
            "Program Other111 success",
            "Program data: still-target",
            "Program Target111 success",
        ]);
        assert_eq!(
            scan_program_logs(&logs, "Target111", PROGRAM_DATA),
            vec!["still-target"]
        );
    }

    fn self_cpi(program: &str, data: Vec<u8>, outer: Option<usize>) -> RawInstruction {
        RawInstruction {
            program_id: program.to_string(),
            accounts: vec![],
            data,
            outer_ix_index: outer,
        }
    }

    fn tagged(disc_name: &str, body: &[u8]) -> Vec<u8> {
        let mut data = event_discriminator("anchor:event").to_vec();
        data.extend_from_slice(&event_discriminator(disc_name));
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_cpi_events_need_tag_and_inner_frame() {
        let ixs = vec![
            self_cpi("Target111", tagged("event:A", &[1, 2]), Some(0)),
            // Top-level instruction carrying the tag is not an event.
            self_cpi("Target111", tagged("event:B", &[3]), None),
            self_cpi("Other111", tagged("event:C", &[4]), Some(0)),
            self_cpi("Target111", vec![0u8; 20], Some(0)),
            self_cpi("Target111", tagged("event:D", &[]), Some(1)),
        ];

        let events = cpi_events(&ixs, "Target111");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (event_discriminator("event:A"), vec![1, 2]));
        assert_eq!(events[1], (event_discriminator("event:D"), vec![]));
    }

    #[test]
    fn test_program_events_fall_back_to_logs() {
        let mut raw = event_discriminator("event:A").to_vec();
        raw.push(7);
        let tx = serde_json::json!({
            "meta": {"logMessages": [
                "Program Target111 invoke [1]",
                format!("Program data: {}", STANDARD.encode(&raw)),
                "Program Target111 success"
            ]},
            "transaction": {"message": {"accountKeys": ["Payer"]}}
        });
        let mut facts = TxFacts::from_json(&tx, "sig");
        assert_eq!(
            program_events(&facts, "Target111"),
            vec![(event_discriminator("event:A"), vec![7])]
        );

        facts
            .instructions
            .push(self_cpi("Target111", tagged("event:B", &[8]), Some(0)));
        assert_eq!(
            program_events(&facts, "Target111"),
            vec![(event_discriminator("event:B"), vec![8])]
        );
    }

    #[test]
    fn test_discriminator_is_sha256_prefix() {
        let disc = event_discriminator("event:TradeEvent");
        let full = Sha256::digest(b"event:TradeEvent");
        assert_eq!(&disc[..], &full[..8]);
        assert_ne!(disc, event_discriminator("event:CreateEvent"));
    }

    #[test]
    fn test_split_event() {
        let mut raw = event_discriminator("event:SwapEvent").to_vec();
        raw.extend_from_slice(&[1, 2, 3]);
        let encoded = STANDARD.encode(&raw);

        let (disc, body) = split_event(&encoded).unwrap();
        assert_eq!(disc, event_discriminator("event:SwapEvent"));
        assert_eq!(body, vec![1, 2, 3]);

        assert!(split_event("!!not base64!!").is_none());
        assert!(split_event(&STANDARD.encode([1u8, 2, 3])).is_none());
    }
}
