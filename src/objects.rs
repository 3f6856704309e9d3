//! Domain objects the engine evaluates: deployments, images, and
//! process-execution events.
//!
//! These are the evaluation-side shapes only; how they are indexed or
//! persisted is out of scope. Builders exist so tests and callers can
//! assemble objects without spelling out every member.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A container deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub containers: Vec<Container>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            namespace: "default".to_string(),
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }
}

/// One container within a deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub privileged: bool,
    pub read_only_root_fs: bool,
    pub add_capabilities: Vec<String>,
    pub drop_capabilities: Vec<String>,
    pub ports: Vec<Port>,
    pub volumes: Vec<Volume>,
    pub resources: Resources,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn read_only_root_fs(mut self, read_only: bool) -> Self {
        self.read_only_root_fs = read_only;
        self
    }

    pub fn with_added_capability(mut self, cap: impl Into<String>) -> Self {
        self.add_capabilities.push(cap.into());
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Port {
    pub port: u16,
    pub protocol: String,
}

impl Port {
    pub fn new(port: u16, protocol: impl Into<String>) -> Self {
        Self {
            port,
            protocol: protocol.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub volume_type: String,
    pub read_only: bool,
}

/// Container resource requests and limits, in cores and MB.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_cores_request: f64,
    pub cpu_cores_limit: f64,
    pub memory_mb_request: f64,
    pub memory_mb_limit: f64,
}

/// A container image with its scanned components.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub registry: String,
    pub remote: String,
    pub tag: String,
    pub components: Vec<Component>,
}

impl Image {
    pub fn new(registry: impl Into<String>, remote: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registry: registry.into(),
            remote: remote.into(),
            tag: tag.into(),
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub version: String,
    pub vulns: Vec<Vulnerability>,
}

impl Component {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            vulns: Vec::new(),
        }
    }

    pub fn with_vuln(mut self, vuln: Vulnerability) -> Self {
        self.vulns.push(vuln);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vulnerability {
    pub cve: String,
    pub cvss: f64,
    pub fixed_by: String,
}

impl Vulnerability {
    pub fn new(cve: impl Into<String>, cvss: f64) -> Self {
        Self {
            cve: cve.into(),
            cvss,
            fixed_by: String::new(),
        }
    }
}

/// A process-execution event observed at runtime.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub id: String,
    pub container_name: String,
    pub name: String,
    pub args: String,
    pub uid: String,
    pub ancestors: Vec<String>,
}

impl ProcessEvent {
    pub fn new(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            args: args.into(),
            ..Default::default()
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = uid.into();
        self
    }
}
