//! Network identity of a VM
//!
//! Turns the per-NIC IP configuration computed for a VM into the three
//! forms the customization engine hands out:
//! - a netplan v2 document embedded in cloud-init metadata
//! - per-adapter settings for Linux guest customization
//! - the per-device status exposed to metadata templates

use crate::vsphere::{
    CustomizationAdapterMapping, CustomizationIpGenerator, CustomizationIpSettings,
    VirtualEthernetCard,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

/// IP configuration of one interface. An empty `ip` means DHCP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IpConfiguration {
    pub ip: String,
    pub subnet_mask: String,
    pub gateway: String,
}

impl IpConfiguration {
    pub fn is_static(&self) -> bool {
        !self.ip.is_empty()
    }
}

/// Desired network interface of a VM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkInterfaceInfo {
    /// MAC address, when already known
    pub mac_address: Option<String>,
    pub ip_configuration: IpConfiguration,
}

/// Ordered list of the interfaces of a VM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetIfList(pub Vec<NetworkInterfaceInfo>);

impl Deref for NetIfList {
    type Target = [NetworkInterfaceInfo];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<NetworkInterfaceInfo>> for NetIfList {
    fn from(list: Vec<NetworkInterfaceInfo>) -> Self {
        Self(list)
    }
}

/// Netplan (network config v2) document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Netplan {
    pub version: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ethernets: BTreeMap<String, NetplanEthernet>,
}

impl Netplan {
    pub fn is_empty(&self) -> bool {
        self.ethernets.is_empty()
    }
}

/// Ethernet interface configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetplanEthernet {
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_config: Option<MatchConfig>,
    #[serde(rename = "set-name", skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dhcp4: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway4: Option<String>,
    #[serde(default, skip_serializing_if = "NameserverConfig::is_empty")]
    pub nameservers: NameserverConfig,
}

/// Nameserver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameserverConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

impl NameserverConfig {
    fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Interface matching configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macaddress: Option<String>,
}

/// Status of one network device as seen by metadata templates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeviceStatus {
    pub gateway4: String,
    pub ip_addresses: Vec<String>,
}

/// Network status as seen by metadata templates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub devices: Vec<NetworkDeviceStatus>,
    pub nameservers: Vec<String>,
}

impl NetIfList {
    /// Build the netplan document for cloud-init.
    ///
    /// Interfaces are named `eth<index>` and matched by the MAC address of
    /// the live card at the same index.
    pub fn netplan(&self, eth_cards: &[VirtualEthernetCard], dns_servers: &[String]) -> Netplan {
        let ethernets = self
            .iter()
            .enumerate()
            .map(|(index, info)| {
                let name = format!("eth{}", index);
                let mac = eth_cards
                    .get(index)
                    .and_then(|card| card.mac_address.as_deref())
                    .or(info.mac_address.as_deref())
                    .map(normalize_mac);

                let ip = &info.ip_configuration;
                let mut ethernet = NetplanEthernet {
                    match_config: mac.map(|macaddress| MatchConfig {
                        macaddress: Some(macaddress),
                    }),
                    set_name: Some(name.clone()),
                    nameservers: NameserverConfig {
                        addresses: dns_servers.to_vec(),
                    },
                    ..Default::default()
                };

                if ip.is_static() {
                    ethernet.addresses = vec![to_cidr_notation(&ip.ip, &ip.subnet_mask)];
                    if !ip.gateway.is_empty() {
                        ethernet.gateway4 = Some(ip.gateway.clone());
                    }
                } else {
                    ethernet.dhcp4 = Some(true);
                }

                (name, ethernet)
            })
            .collect();

        Netplan {
            version: 2,
            ethernets,
        }
    }

    /// Per-adapter settings for Linux guest customization
    pub fn interface_customizations(&self) -> Vec<CustomizationAdapterMapping> {
        self.iter()
            .map(|info| {
                let ip = &info.ip_configuration;
                let adapter = if ip.is_static() {
                    CustomizationIpSettings {
                        ip: CustomizationIpGenerator::Fixed {
                            ip_address: ip.ip.clone(),
                        },
                        subnet_mask: Some(ip.subnet_mask.clone()),
                        gateway: if ip.gateway.is_empty() {
                            Vec::new()
                        } else {
                            vec![ip.gateway.clone()]
                        },
                    }
                } else {
                    CustomizationIpSettings {
                        ip: CustomizationIpGenerator::Dhcp,
                        subnet_mask: None,
                        gateway: Vec::new(),
                    }
                };

                CustomizationAdapterMapping {
                    mac_address: info.mac_address.as_deref().map(normalize_mac),
                    adapter,
                }
            })
            .collect()
    }

    /// Device status in interface order.
    ///
    /// DHCP interfaces report an empty address list rather than a
    /// placeholder such as `/0`, since no address is known before the guest
    /// leases one.
    pub fn devices_status(&self) -> Vec<NetworkDeviceStatus> {
        self.iter()
            .map(|info| {
                let ip = &info.ip_configuration;
                NetworkDeviceStatus {
                    gateway4: ip.gateway.clone(),
                    ip_addresses: if ip.is_static() {
                        vec![to_cidr_notation(&ip.ip, &ip.subnet_mask)]
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect()
    }

    /// Device status plus nameservers
    pub fn network_status(&self, dns_servers: &[String]) -> NetworkStatus {
        NetworkStatus {
            devices: self.devices_status(),
            nameservers: dns_servers.to_vec(),
        }
    }
}

/// Format `ip` and `netmask` as `ip/prefix`
pub fn to_cidr_notation(ip: &str, netmask: &str) -> String {
    format!("{}/{}", ip, netmask_to_prefix(netmask))
}

/// Convert netmask to CIDR prefix length.
///
/// A bare prefix length is accepted up to 32. Anything else that is not a
/// dotted-decimal mask yields 0.
pub fn netmask_to_prefix(netmask: &str) -> u8 {
    // Handle CIDR notation directly
    if let Ok(prefix) = netmask.parse::<u8>() {
        return if prefix <= 32 { prefix } else { 0 };
    }

    match netmask.parse::<std::net::Ipv4Addr>() {
        Ok(mask) => u32::from(mask).count_ones() as u8,
        Err(_) => 0,
    }
}

/// Lower-case, colon separated MAC address
fn normalize_mac(mac: &str) -> String {
    mac.trim().to_ascii_lowercase().replace('-', ":")
}
