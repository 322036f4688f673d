//! ACL rule codec: textual access-control rules to 64-bit mask components.
//!
//! A rule reads `<user> <resource> <rights> [<zone>]`, for example
//! `#5 HOST+VM/@12 USE+MANAGE #0`. Each component encodes to a 64-bit value:
//! a type tag in the nibble above bit 32 (`#` user, `@` group, `*` all,
//! `%` cluster), the numeric id in the low 32 bits, and for resources the
//! type bits OR'd above bit 36. Components are rendered as minimal-width
//! lowercase hex strings prefixed `0x`, ready for the `one.acl.addrule` call.

use bitflags::bitflags;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AclError {
    #[error("malformed id component: {0}")]
    Ids(String),
    #[error("unknown resource type: {0}")]
    Resource(String),
    #[error("unknown right: {0}")]
    Right(String),
    #[error("malformed rule: {0}")]
    Rule(String),
}

bitflags! {
    /// Rights an ACL rule can grant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Rights: u64 {
        const USE = 0x1;
        const MANAGE = 0x2;
        const ADMIN = 0x4;
        const CREATE = 0x8;
    }
}

const USER_TAG: u64 = 0x1;
const GROUP_TAG: u64 = 0x2;
const ALL_TAG: u64 = 0x3;
const CLUSTER_TAG: u64 = 0x4;
/// Sentinel id meaning "every id" for the `*` selector.
const ALL_IDS: u64 = 0xFFFF_FFFF;

fn resource_type_mask(name: &str) -> Option<u64> {
    match name {
        "VM" => Some(0x1000000000),
        "HOST" => Some(0x2000000000),
        "NET" => Some(0x4000000000),
        "IMAGE" => Some(0x8000000000),
        "USER" => Some(0x10000000000),
        "TEMPLATE" => Some(0x20000000000),
        "GROUP" => Some(0x40000000000),
        "DATASTORE" => Some(0x100000000000),
        "CLUSTER" => Some(0x200000000000),
        "DOCUMENT" => Some(0x400000000000),
        "ZONE" => Some(0x800000000000),
        "SECGROUP" => Some(0x1000000000000),
        "VDC" => Some(0x2000000000000),
        "VROUTER" => Some(0x4000000000000),
        "MARKETPLACE" => Some(0x8000000000000),
        "MARKETPLACEAPP" => Some(0x10000000000000),
        "VMGROUP" => Some(0x20000000000000),
        "VNTEMPLATE" => Some(0x40000000000000),
        _ => None,
    }
}

fn hex(value: u64) -> String {
    format!("{value:#x}")
}

/// Encode an id selector (`#5`, `@12`, `%0`, `*`) to its 64-bit value.
pub fn calculate_ids(token: &str) -> Result<u64, AclError> {
    if token == "*" {
        return Ok((ALL_TAG << 32) | ALL_IDS);
    }
    let mut chars = token.chars();
    let tag = chars
        .next()
        .ok_or_else(|| AclError::Ids("empty id component".into()))?;
    let kind = match tag {
        '#' => USER_TAG,
        '@' => GROUP_TAG,
        '%' => CLUSTER_TAG,
        _ => return Err(AclError::Ids(format!("unknown tag in '{token}'"))),
    };
    let id: u64 = chars
        .as_str()
        .parse()
        .map_err(|_| AclError::Ids(format!("invalid numeric id in '{token}'")))?;
    if id > ALL_IDS {
        return Err(AclError::Ids(format!("id out of range in '{token}'")));
    }
    Ok((kind << 32) | id)
}

/// Encode the user component of a rule as a hex string.
pub fn parse_users(token: &str) -> Result<String, AclError> {
    calculate_ids(token).map(hex)
}

/// Encode the zone component of a rule as a hex string.
pub fn parse_zone(token: &str) -> Result<String, AclError> {
    calculate_ids(token).map(hex)
}

/// Encode the resource component (`TYPE[+TYPE...]/<id selector>`) as a hex string.
pub fn parse_resources(token: &str) -> Result<String, AclError> {
    let (types, ids) = token
        .split_once('/')
        .ok_or_else(|| AclError::Rule(format!("resource component '{token}' lacks an id part")))?;
    let mut mask = calculate_ids(ids)?;
    for name in types.split('+') {
        mask |= resource_type_mask(name).ok_or_else(|| AclError::Resource(name.to_string()))?;
    }
    Ok(hex(mask))
}

/// Encode a `+`-joined list of right names as a hex string.
pub fn parse_rights(names: &str) -> Result<String, AclError> {
    let mut rights = Rights::empty();
    for name in names.split('+') {
        rights |= Rights::from_name(name).ok_or_else(|| AclError::Right(name.to_string()))?;
    }
    if rights.is_empty() {
        return Err(AclError::Rule("empty rights component".into()));
    }
    Ok(hex(rights.bits()))
}

/// The four encoded components of an ACL rule. The zone component is optional
/// in the textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclRule {
    pub user: String,
    pub resource: String,
    pub rights: String,
    pub zone: Option<String>,
}

/// Parse a full rule string into its encoded components.
pub fn parse_rule(rule: &str) -> Result<AclRule, AclError> {
    let tokens: Vec<&str> = rule.split_whitespace().collect();
    let (user, resource, rights, zone) = match tokens.as_slice() {
        [user, resource, rights] => (*user, *resource, *rights, None),
        [user, resource, rights, zone] => (*user, *resource, *rights, Some(*zone)),
        _ => {
            return Err(AclError::Rule(format!(
                "expected 3 or 4 tokens, got {}",
                tokens.len()
            )))
        }
    };
    Ok(AclRule {
        user: parse_users(user)?,
        resource: parse_resources(resource)?,
        rights: parse_rights(rights)?,
        zone: zone.map(parse_zone).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_and_group_ids() {
        assert_eq!(calculate_ids("#5").unwrap(), 4294967301);
        assert_eq!(parse_users("#5").unwrap(), "0x100000005");
        assert_eq!(parse_users("@5").unwrap(), "0x200000005");
        assert_eq!(parse_users("%10").unwrap(), "0x40000000a");
    }

    #[test]
    fn all_selector_uses_the_sentinel() {
        assert_eq!(parse_users("*").unwrap(), "0x3ffffffff");
    }

    #[test]
    fn rights_encode_case_sensitively() {
        assert_eq!(parse_rights("ADMIN").unwrap(), "0x4");
        assert_eq!(parse_rights("USE+MANAGE").unwrap(), "0x3");
        assert_eq!(parse_rights("USE+MANAGE+ADMIN+CREATE").unwrap(), "0xf");
        assert!(matches!(parse_rights("use"), Err(AclError::Right(_))));
        assert!(matches!(parse_rights("USE+OWN"), Err(AclError::Right(_))));
    }

    #[test]
    fn resource_component_ors_type_bits() {
        assert_eq!(parse_resources("HOST+VM/@12").unwrap(), "0x320000000c");
        assert_eq!(
            parse_resources("MARKETPLACEAPP/*").unwrap(),
            "0x100003ffffffff"
        );
        assert!(matches!(
            parse_resources("FOO+VM/#1"),
            Err(AclError::Resource(_))
        ));
        assert!(matches!(parse_resources("VM"), Err(AclError::Rule(_))));
    }

    #[test]
    fn full_rule_with_zone() {
        let rule = parse_rule("#5 HOST+VM/@12 USE+MANAGE #0").unwrap();
        assert_eq!(rule.user, "0x100000005");
        assert_eq!(rule.resource, "0x320000000c");
        assert_eq!(rule.rights, "0x3");
        assert_eq!(rule.zone.as_deref(), Some("0x100000000"));
    }

    #[test]
    fn zone_is_optional() {
        let rule = parse_rule("@105 NET/#2 USE").unwrap();
        assert_eq!(rule.user, "0x200000069");
        assert_eq!(rule.resource, "0x4100000002");
        assert_eq!(rule.rights, "0x1");
        assert_eq!(rule.zone, None);
    }

    #[test]
    fn malformed_rules_fail() {
        assert!(matches!(parse_rule("#5 HOST/#1"), Err(AclError::Rule(_))));
        assert!(matches!(
            parse_rule("x5 HOST/#1 USE"),
            Err(AclError::Ids(_))
        ));
        assert!(matches!(
            parse_rule("#5 HOST/#1 USE #0 extra"),
            Err(AclError::Rule(_))
        ));
        assert!(matches!(calculate_ids("#abc"), Err(AclError::Ids(_))));
        assert!(matches!(calculate_ids(""), Err(AclError::Ids(_))));
        assert!(matches!(calculate_ids("#5000000000"), Err(AclError::Ids(_))));
    }
}
