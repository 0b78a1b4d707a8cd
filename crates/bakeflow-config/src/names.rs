//! Random names for the temporary resources of one build

use rand::Rng;
use rand::seq::SliceRandom;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

const SUFFIX_LEN: usize = 10;
const PASSWORD_LEN: usize = 32;

/// Names shared by every temporary resource of a build. All of them end in
/// the same random suffix so the resources of one build can be told apart
/// from another's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempNames {
    pub suffix: String,
    pub compute_name: String,
    pub deployment_name: String,
    pub key_vault_deployment_name: String,
    pub resource_group_name: String,
    pub os_disk_name: String,
    pub key_vault_name: String,
    pub nic_name: String,
    pub public_ip_name: String,
    pub subnet_name: String,
    pub virtual_network_name: String,
    pub admin_password: String,
    pub certificate_password: String,
}

impl TempNames {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix = random_string(&mut rng, SUFFIX_CHARSET, SUFFIX_LEN);
        Self::with_suffix(
            &suffix,
            random_password(&mut rng),
            random_password(&mut rng),
        )
    }

    fn with_suffix(suffix: &str, admin_password: String, certificate_password: String) -> Self {
        Self {
            suffix: suffix.to_string(),
            compute_name: format!("bkvm{}", suffix),
            deployment_name: format!("bkdp{}", suffix),
            key_vault_deployment_name: format!("bkkvdp{}", suffix),
            resource_group_name: format!("bakeflow-Resource-Group-{}", suffix),
            os_disk_name: format!("bkos{}", suffix),
            key_vault_name: format!("bkkv{}", suffix),
            nic_name: format!("bkni{}", suffix),
            public_ip_name: format!("bkip{}", suffix),
            subnet_name: format!("bksn{}", suffix),
            virtual_network_name: format!("bkvn{}", suffix),
            admin_password,
            certificate_password,
        }
    }
}

fn random_string(rng: &mut impl Rng, charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| charset[rng.gen_range(0..charset.len())] as char)
        .collect()
}

/// A password that satisfies the provider's complexity rule: at least one
/// lower-case letter, one upper-case letter and one digit.
fn random_password(rng: &mut impl Rng) -> String {
    let all: Vec<u8> = [LOWER, UPPER, DIGITS].concat();
    let mut chars: Vec<u8> = vec![
        LOWER[rng.gen_range(0..LOWER.len())],
        UPPER[rng.gen_range(0..UPPER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
    ];
    chars.extend((chars.len()..PASSWORD_LEN).map(|_| all[rng.gen_range(0..all.len())]));
    chars.shuffle(rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_share_suffix() {
        let names = TempNames::generate();

        assert_eq!(names.suffix.len(), SUFFIX_LEN);
        assert!(names.suffix.bytes().all(|b| SUFFIX_CHARSET.contains(&b)));
        for name in [
            &names.compute_name,
            &names.deployment_name,
            &names.resource_group_name,
            &names.os_disk_name,
            &names.key_vault_name,
        ] {
            assert!(name.ends_with(&names.suffix), "{}", name);
        }
    }

    #[test]
    fn test_password_complexity() {
        for _ in 0..50 {
            let password = TempNames::generate().admin_password;
            assert_eq!(password.len(), PASSWORD_LEN);
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generated_names_differ() {
        assert_ne!(TempNames::generate().suffix, TempNames::generate().suffix);
    }
}
