//! Closed set of Yaook resource kinds this tool knows how to address.

use std::fmt;
use std::str::FromStr;

use kube::core::{ApiResource, GroupVersionKind};

use crate::error::RecoveryError;

/// API version shared by all Yaook custom resources.
pub const YAOOK_API_VERSION: &str = "v1";

/// A Yaook custom resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    NovaComputeNode,
    NeutronL2Agent,
    NeutronL3Agent,
    NeutronDhcpAgent,
    NeutronBgpDrAgent,
    MySqlService,
    OvsdbService,
}

impl ResourceKind {
    pub const ALL: [Self; 7] = [
        Self::NovaComputeNode,
        Self::NeutronL2Agent,
        Self::NeutronL3Agent,
        Self::NeutronDhcpAgent,
        Self::NeutronBgpDrAgent,
        Self::MySqlService,
        Self::OvsdbService,
    ];

    /// Alias, plural, group and kind.
    fn row(self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            Self::NovaComputeNode => ("compute", "novacomputenodes", "compute.yaook.cloud", "NovaComputeNode"),
            Self::NeutronL2Agent => ("l2", "neutronl2agents", "network.yaook.cloud", "NeutronL2Agent"),
            Self::NeutronL3Agent => ("l3", "neutronl3agents", "network.yaook.cloud", "NeutronL3Agent"),
            Self::NeutronDhcpAgent => ("dhcp", "neutrondhcpagents", "network.yaook.cloud", "NeutronDHCPAgent"),
            Self::NeutronBgpDrAgent => ("bgp", "neutronbgpdragents", "network.yaook.cloud", "NeutronBGPDRAgent"),
            Self::MySqlService => ("mysql", "mysqlservices", "infra.yaook.cloud", "MySQLService"),
            Self::OvsdbService => ("ovsdb", "ovsdbservices", "infra.yaook.cloud", "OVSDBService"),
        }
    }

    /// Short CLI alias (`compute`, `l2`, ...).
    pub fn alias(self) -> &'static str {
        self.row().0
    }

    pub fn plural(self) -> &'static str {
        self.row().1
    }

    pub fn group(self) -> &'static str {
        self.row().2
    }

    pub fn kind(self) -> &'static str {
        self.row().3
    }

    /// Whether the resource is a per-node agent that may be force-upgraded.
    pub fn is_upgradable(self) -> bool {
        !matches!(self, Self::MySqlService | Self::OvsdbService)
    }

    /// Dynamic API descriptor for kube's `DynamicObject` API.
    pub fn api_resource(self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(self.group(), YAOOK_API_VERSION, self.kind());
        ApiResource::from_gvk_with_plural(&gvk, self.plural())
    }

    /// Resolve an alias or plural, restricted to force-upgradable kinds.
    pub fn parse_upgradable(input: &str) -> Result<Self, RecoveryError> {
        let kind: Self = input.parse()?;
        if kind.is_upgradable() {
            Ok(kind)
        } else {
            Err(RecoveryError::validation(
                format!("{} is not a thing which can be force-upgraded", kind.plural()),
                Some(&format!("supported kinds: {}", upgradable_aliases().join(", "))),
            ))
        }
    }
}

/// Aliases of all kinds accepted by `force-upgrade`.
pub fn upgradable_aliases() -> Vec<&'static str> {
    ResourceKind::ALL
        .iter()
        .filter(|k| k.is_upgradable())
        .map(|k| k.alias())
        .collect()
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.plural())
    }
}

impl FromStr for ResourceKind {
    type Err = RecoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.alias() == needle || kind.plural() == needle)
            .ok_or_else(|| {
                let aliases: Vec<_> = Self::ALL.iter().map(|k| k.alias()).collect();
                RecoveryError::validation(
                    format!("{s} is not a known Yaook resource kind"),
                    Some(&format!("supported kinds: {}", aliases.join(", "))),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_round_trips_through_alias() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.alias().parse::<ResourceKind>().unwrap(), kind);
            assert!(kind.group().ends_with("yaook.cloud"));
        }
    }

    #[test]
    fn test_parse_alias_and_plural() {
        assert_eq!("compute".parse::<ResourceKind>().unwrap(), ResourceKind::NovaComputeNode);
        assert_eq!("neutronl3agents".parse::<ResourceKind>().unwrap(), ResourceKind::NeutronL3Agent);
        assert_eq!("OVSDB".parse::<ResourceKind>().unwrap(), ResourceKind::OvsdbService);
    }

    #[test]
    fn test_unknown_kind_is_validation_error() {
        let err = "keystone".parse::<ResourceKind>().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_VALIDATION);
    }

    #[test]
    fn test_services_are_not_upgradable() {
        let err = ResourceKind::parse_upgradable("mysql").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_VALIDATION);
        assert_eq!(ResourceKind::parse_upgradable("l2").unwrap(), ResourceKind::NeutronL2Agent);
        assert_eq!(upgradable_aliases(), vec!["compute", "l2", "l3", "dhcp", "bgp"]);
    }

    #[test]
    fn test_api_resource() {
        let ar = ResourceKind::NeutronDhcpAgent.api_resource();
        assert_eq!(ar.group, "network.yaook.cloud");
        assert_eq!(ar.plural, "neutrondhcpagents");
        assert_eq!(ar.api_version, "network.yaook.cloud/v1");
    }
}
