use time::OffsetDateTime;
use uuid::Uuid;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn to_base36(mut n: u128) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn random_u128() -> u128 {
    Uuid::new_v4().as_u128()
}

/// `len` random base36 characters.
pub fn random_base36(len: usize) -> String {
    let mut n = random_u128();
    (0..len)
        .map(|_| {
            let c = BASE36[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}

pub fn now_millis() -> u128 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u128::try_from(nanos / 1_000_000).unwrap_or_default()
}

/// Generated identity for a new row.
///
/// Customers get a short `KH` + 4 character code; every other entity gets
/// prefix + base36 millis + 5 random base36 characters, uppercased.
pub fn generate_id(prefix: &str) -> String {
    if prefix == "KH" {
        let mut n = random_u128();
        let code: String = (0..4)
            .map(|_| {
                let c = ALPHANUMERIC[(n % ALPHANUMERIC.len() as u128) as usize] as char;
                n /= ALPHANUMERIC.len() as u128;
                c
            })
            .collect();
        return format!("{prefix}{code}");
    }

    format!(
        "{prefix}{}{}",
        to_base36(now_millis()),
        random_base36(5)
    )
    .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn customer_codes_are_short() {
        let id = generate_id("KH");
        assert_eq!(id.len(), 6);
        assert!(id.starts_with("KH"));
        assert!(id[2..]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn other_ids_carry_timestamp_and_random_tail() {
        let id = generate_id("DH");
        assert!(id.starts_with("DH"));
        assert!(id.len() >= 2 + 8 + 5);
        assert_eq!(id, id.to_uppercase());
        assert_ne!(generate_id("DH"), generate_id("DH"));
    }
}
