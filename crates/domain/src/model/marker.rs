use super::Transaction;

/// `OP_RETURN` followed by a 48-byte push.
pub const MARKER_PREFIX: &str = "6a30";

/// Prefix plus 48 bytes of payload, in hex characters.
pub const MARKER_RECORD_LENGTH: usize = MARKER_PREFIX.len() + 2 * 48;

/// Returns `true` when any output of `tx` carries the payment marker record.
pub fn is_marked_payment(tx: &Transaction) -> bool {
    tx.outputs.iter().any(|output| is_marker_script(output.script_hex()))
}

fn is_marker_script(script_hex: &str) -> bool {
    script_hex.len() == MARKER_RECORD_LENGTH && script_hex.starts_with(MARKER_PREFIX)
}
