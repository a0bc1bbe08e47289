//! MAC address aliasing for sensors.
//!
//! Maps MAC addresses to human-readable names, overriding the name the
//! device advertises (stock pvvx names look like `ATC_0BEEFF`).

use crate::mac_address::MacAddress;
use std::collections::HashMap;

/// A type alias for MAC-to-name mappings.
pub type AliasMap = HashMap<MacAddress, String>;

/// A parsed alias mapping a MAC address to a human-readable name.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub address: MacAddress,
    pub name: String,
}

/// Parse an alias from a string in the format "MAC=NAME".
///
/// # Example
/// ```
/// use pvvx_listener::alias::parse_alias;
///
/// let alias = parse_alias("A4:C1:38:0B:EE:FF=Bedroom").unwrap();
/// assert_eq!(alias.address.to_string(), "A4:C1:38:0B:EE:FF");
/// assert_eq!(alias.name, "Bedroom");
/// ```
pub fn parse_alias(src: &str) -> Result<Alias, String> {
    let (address, name) = src
        .split_once('=')
        .ok_or_else(|| "invalid alias: expected format MAC=NAME".to_string())?;

    if name.is_empty() {
        return Err("invalid alias: name is empty".into());
    }
    if name.contains('/') {
        return Err("invalid alias: name must not contain '/'".into());
    }

    Ok(Alias {
        address: address.parse().map_err(|e| format!("{e}"))?,
        name: name.into(),
    })
}

/// Convert a slice of Alias values into an AliasMap. Later entries win.
pub fn to_map(aliases: &[Alias]) -> AliasMap {
    aliases
        .iter()
        .map(|a| (a.address, a.name.clone()))
        .collect()
}

/// Pick the display name for a device: an alias if configured, otherwise the
/// advertised name.
pub fn resolve_name<'a>(
    mac: &MacAddress,
    advertised: Option<&'a str>,
    aliases: &'a AliasMap,
) -> Option<&'a str> {
    aliases.get(mac).map(String::as_str).or(advertised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;

    #[test]
    fn test_parse_alias_valid() {
        let alias = parse_alias("AA:BB:CC:DD:EE:FF=Kitchen").unwrap();
        assert_eq!(alias.address, TEST_MAC);
        assert_eq!(alias.name, "Kitchen");
    }

    #[test]
    fn test_parse_alias_with_spaces() {
        let alias = parse_alias("aa:bb:cc:dd:ee:ff=Living Room").unwrap();
        assert_eq!(alias.address, TEST_MAC);
        assert_eq!(alias.name, "Living Room");
    }

    #[test]
    fn test_parse_alias_invalid() {
        assert!(parse_alias("no-equals-sign").is_err());
        assert!(parse_alias("AA:BB:CC:DD:EE:FF=").is_err());
        assert!(parse_alias("AA:BB:CC=Kitchen").is_err());
        assert_eq!(
            parse_alias("AA:BB:CC:DD:EE:FF=Up/Down").unwrap_err(),
            "invalid alias: name must not contain '/'"
        );
    }

    #[test]
    fn test_to_map() {
        let other = MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let aliases = vec![
            Alias {
                address: TEST_MAC,
                name: "Kitchen".to_string(),
            },
            Alias {
                address: other,
                name: "Bedroom".to_string(),
            },
        ];
        let map = to_map(&aliases);
        assert_eq!(map.get(&TEST_MAC), Some(&"Kitchen".to_string()));
        assert_eq!(map.get(&other), Some(&"Bedroom".to_string()));
        assert_eq!(map.get(&MacAddress::default()), None);
    }

    #[test]
    fn test_resolve_name_prefers_alias() {
        let map = to_map(&[parse_alias("AA:BB:CC:DD:EE:FF=Sauna").unwrap()]);
        assert_eq!(resolve_name(&TEST_MAC, Some("ATC_DDEEFF"), &map), Some("Sauna"));
    }

    #[test]
    fn test_resolve_name_falls_back_to_advertised() {
        let map = AliasMap::new();
        assert_eq!(
            resolve_name(&TEST_MAC, Some("ATC_DDEEFF"), &map),
            Some("ATC_DDEEFF")
        );
        assert_eq!(resolve_name(&TEST_MAC, None, &map), None);
    }
}
