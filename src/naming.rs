//! DNS-SD style names used to label peers.
//!
//! Pure string derivations; nothing here touches the network.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use mdns_sd::ServiceInfo;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Instance, service type and domain, with the names derived from them.
///
/// Immutable: the derived names are computed once at construction, so they
/// can never go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RecordFields", into = "RecordFields")]
pub struct ServiceRecord {
    instance: String,
    service: String,
    domain: String,
    service_name: String,
    service_instance_name: String,
    service_type_name: String,
}

#[derive(Serialize, Deserialize)]
struct RecordFields {
    #[serde(rename = "name", default)]
    instance: String,
    #[serde(rename = "type", default)]
    service: String,
    #[serde(default)]
    domain: String,
}

impl From<RecordFields> for ServiceRecord {
    fn from(f: RecordFields) -> Self {
        Self::new(f.instance, f.service, f.domain)
    }
}

impl From<ServiceRecord> for RecordFields {
    fn from(r: ServiceRecord) -> Self {
        Self {
            instance: r.instance,
            service: r.service,
            domain: r.domain,
        }
    }
}

impl ServiceRecord {
    pub fn new(
        instance: impl Into<String>,
        service: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        let instance = instance.into();
        let service = service.into();
        let domain = domain.into();

        let service_name = format!("{}.{}.", trim_dot(&service), trim_dot(&domain));
        let service_instance_name = if instance.is_empty() {
            String::new()
        } else {
            format!("{}.{}", trim_dot(&instance), service_name)
        };
        let type_domain = if domain.is_empty() {
            "local"
        } else {
            trim_dot(&domain)
        };
        let service_type_name = format!("_services._dns-sd._udp.{type_domain}.");

        Self {
            instance,
            service,
            domain,
            service_name,
            service_instance_name,
            service_type_name,
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `<service>.<domain>.`
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// `<instance>.<service>.<domain>.`, or empty without an instance.
    pub fn service_instance_name(&self) -> &str {
        &self.service_instance_name
    }

    /// `_services._dns-sd._udp.<domain>.`, defaulting the domain to `local`.
    pub fn service_type_name(&self) -> &str {
        &self.service_type_name
    }

    /// Describe this instance for an mDNS responder.
    pub fn service_info(
        &self,
        host_name: &str,
        ip: IpAddr,
        port: u16,
        properties: &[(&str, &str)],
    ) -> Result<ServiceInfo> {
        if self.instance.is_empty() {
            return Err(Error::Naming("service instance name is empty".to_string()));
        }
        ServiceInfo::new(
            &self.service_name,
            trim_dot(&self.instance),
            host_name,
            &ip.to_string(),
            port,
            properties,
        )
        .map_err(|e| Error::Naming(e.to_string()))
    }
}

/// A resolved service instance, as a lookup would report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(flatten)]
    pub record: ServiceRecord,
    #[serde(rename = "hostname", default)]
    pub host_name: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub ttl: u32,
    #[serde(skip)]
    pub addr_ipv4: Option<Ipv4Addr>,
    #[serde(skip)]
    pub addr_ipv6: Option<Ipv6Addr>,
}

impl ServiceEntry {
    pub fn new(
        instance: impl Into<String>,
        service: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            record: ServiceRecord::new(instance, service, domain),
            host_name: String::new(),
            port: 0,
            text: Vec::new(),
            ttl: 0,
            addr_ipv4: None,
            addr_ipv6: None,
        }
    }

    /// Whichever address is known, preferring IPv4.
    pub fn addr(&self) -> Option<IpAddr> {
        self.addr_ipv4
            .map(IpAddr::V4)
            .or(self.addr_ipv6.map(IpAddr::V6))
    }
}

fn trim_dot(s: &str) -> &str {
    s.trim_matches('.')
}
