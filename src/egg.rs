use std::time::{SystemTime, UNIX_EPOCH};

const DEER: &str = r#"
  \|/      \|/
   \\      //
    \\____//
    ( o  o )
     \    /
      \__/
"#;

/// Maps `seed` onto 0..100 and fires when the value falls below `chance`.
pub fn roll(chance: u8, seed: &[u8]) -> bool {
    if chance == 0 {
        return false;
    }
    if chance >= 100 {
        return true;
    }
    let hash = blake3::hash(seed);
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(head) % 100 < u64::from(chance)
}

pub fn roll_now(chance: u8) -> bool {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut seed = nanos.to_le_bytes().to_vec();
    seed.extend_from_slice(&std::process::id().to_le_bytes());
    roll(chance, &seed)
}

pub fn deer() -> &'static str {
    DEER
}
