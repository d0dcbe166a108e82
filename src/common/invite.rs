use rand::distributions::Alphanumeric;
use rand::Rng;

pub const INVITE_CODE_LEN: usize = 7;

/// Fresh invite code for a private group, generated before the group row is inserted.
pub fn generate_invite_code() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(INVITE_CODE_LEN)
        .map(char::from)
        .collect()
}

/// Shape check only; whether a group actually uses the code is up to the backend.
pub fn has_valid_shape(code: &str) -> bool {
    code.chars().count() == INVITE_CODE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_codes_are_seven_alphanumerics() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let code = generate_with(&mut rng);
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(has_valid_shape(&code));
        }
    }

    #[test]
    fn shape_is_length_based() {
        assert!(has_valid_shape("ABC1234"));
        assert!(!has_valid_shape("AB12"));
        assert!(!has_valid_shape("ABC12345"));
        assert!(!has_valid_shape(""));
    }
}
