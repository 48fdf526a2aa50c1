use serde::{Deserialize, Serialize};

/// Driver profile owned by the host application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: Option<String>,
    /// Free-form, whatever the driver typed
    pub age: Option<String>,
    pub profile_image: Option<Vec<u8>>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Driver",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(UserProfile::default().display_name(), "Driver");

        let blank = UserProfile {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.display_name(), "Driver");

        let named = UserProfile {
            name: Some("Sam".to_string()),
            ..Default::default()
        };
        assert_eq!(named.display_name(), "Sam");
    }

    #[test]
    fn test_profile_bytes_survive_json() {
        let profile = UserProfile {
            name: Some("Alex".to_string()),
            age: Some("thirty-ish".to_string()),
            profile_image: Some(vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]),
        };
        let json = serde_json::to_vec(&profile).unwrap();
        let back: UserProfile = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, profile);
        assert_eq!(back.profile_image.as_deref(), Some(&[0x89, 0x50, 0x4e, 0x47, 0x00, 0xff][..]));
    }
}
