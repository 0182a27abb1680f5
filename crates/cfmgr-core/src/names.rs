//! Random `<adjective>-<noun>` names for tunnels created without a subdomain.
//!
//! No uniqueness is enforced here; two calls may return the same name.

use rand::RngExt;

#[rustfmt::skip]
pub const ADJECTIVES: &[&str] = &[
    "morbid", "sarcastic", "chaotic", "deranged", "manic",
    "nihilistic", "twisted", "grotesque", "unhinged", "macabre",
    "sinister", "eerie", "hysterical", "toxic", "bleak",
    "lunatic", "cryptic", "damned", "grim", "volatile",
];

#[rustfmt::skip]
pub const NOUNS: &[&str] = &[
    "ghost", "zombie", "vampire", "skeleton", "demon",
    "witch", "phantom", "wraith", "specter", "goblin",
    "banshee", "ghoul", "mutant", "shade", "reaper",
];

/// Generate a human-memorable name such as `eerie-goblin`.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    format!("{adjective}-{noun}")
}
