use rand::distr::Alphanumeric;
use rand::Rng;

/// random hex id, used for media transport ids
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Short human-shareable code over `[A-Za-z0-9]`.
pub fn generate_signaling_id(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len.max(1))
        .map(char::from)
        .collect()
}

/// Username sent along with a call request.
pub fn display_name(prefix: &str, signaling_id: &str) -> String {
    format!("{prefix}{signaling_id}")
}
