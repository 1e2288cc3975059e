use rand::seq::SliceRandom;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Base58: alphanumerics without `0`, `O`, `I` and `l`.
pub const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
pub const KEY_LENGTH: usize = 64;
pub const MAX_USERNAME_LENGTH: usize = 50;

pub const PLAYER_KEY_PREFIX: char = 'p';
pub const INVITE_CODE_PREFIX: char = 'g';

const ADJECTIVES: &[&str] = &[
    "Amber", "Brave", "Clever", "Dusty", "Eager", "Fuzzy", "Gentle", "Hasty", "Icy", "Jolly",
    "Lucky", "Mellow", "Nimble", "Quiet", "Rusty", "Silent", "Swift", "Tidy", "Witty", "Zesty",
];

const ANIMALS: &[&str] = &[
    "Badger", "Crane", "Dingo", "Falcon", "Gecko", "Heron", "Ibis", "Jackal", "Koala", "Lemur",
    "Marmot", "Newt", "Otter", "Panda", "Quokka", "Raven", "Stoat", "Tapir", "Walrus", "Yak",
];

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Random base58 key of `KEY_LENGTH` characters behind a one-letter prefix.
pub fn generate_key(prefix: char) -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(KEY_LENGTH + 1);
    key.push(prefix);
    for _ in 0..KEY_LENGTH {
        let index = rng.gen_range(0..BASE58_ALPHABET.len());
        key.push(BASE58_ALPHABET[index] as char);
    }
    key
}

/// Guest name such as "SwiftOtter".
pub fn random_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Anonymous");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Player");
    format!("{adjective}{animal}")
}

/// Trims the requested name and caps it at `MAX_USERNAME_LENGTH` characters.
/// Returns `None` when nothing usable is left.
pub fn sanitize_username(username: &str) -> Option<String> {
    let trimmed = username.trim();
    let capped: String = trimmed.chars().take(MAX_USERNAME_LENGTH).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        None
    } else {
        Some(capped.to_string())
    }
}
