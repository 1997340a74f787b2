//! Static catalog of CLIP v2 resource types.
//!
//! Each entry lists the HTTP methods a resource type supports on its
//! collection (`/clip/v2/resource/{type}`) and on a single instance
//! (`/clip/v2/resource/{type}/{id}`), plus an optional rate-limit policy
//! that replaces the host default for that resource.

use strum::{Display, EnumString};

use crate::error::Error;
use crate::rate::RatePolicy;

/// Base path for resource operations.
pub const RESOURCE_BASE: &str = "/clip/v2/resource";

/// Path of the bridge event stream.
pub const EVENT_STREAM_PATH: &str = "/eventstream/clip/v2";

// ── HttpMethod ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

// ── ResourceSpec ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Collection,
    Instance,
}

impl Scope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Instance => "instance",
        }
    }
}

#[derive(Debug)]
pub struct ResourceSpec {
    pub resource_type: &'static str,
    pub collection: &'static [HttpMethod],
    pub instance: &'static [HttpMethod],
    pub rate: Option<RatePolicy>,
}

impl ResourceSpec {
    pub fn allows(&self, method: HttpMethod, scope: Scope) -> bool {
        match scope {
            Scope::Collection => self.collection.contains(&method),
            Scope::Instance => self.instance.contains(&method),
        }
    }

    /// URL path for the collection, or for one instance when `id` is given.
    pub fn path(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{RESOURCE_BASE}/{}/{id}", self.resource_type),
            None => format!("{RESOURCE_BASE}/{}", self.resource_type),
        }
    }
}

// ── Catalog table ────────────────────────────────────────────────────

const R: &[HttpMethod] = &[HttpMethod::Get];
const RC: &[HttpMethod] = &[HttpMethod::Get, HttpMethod::Post];
const RU: &[HttpMethod] = &[HttpMethod::Get, HttpMethod::Put];
const RD: &[HttpMethod] = &[HttpMethod::Get, HttpMethod::Delete];
const RUD: &[HttpMethod] = &[HttpMethod::Get, HttpMethod::Put, HttpMethod::Delete];

/// Group commands fan out to every member light on the bridge side.
const GROUPED_LIGHT_RATE: RatePolicy = RatePolicy::new(1, 1000);

macro_rules! resource {
    ($name:literal, $collection:expr, $instance:expr) => {
        ResourceSpec {
            resource_type: $name,
            collection: $collection,
            instance: $instance,
            rate: None,
        }
    };
    ($name:literal, $collection:expr, $instance:expr, $rate:expr) => {
        ResourceSpec {
            resource_type: $name,
            collection: $collection,
            instance: $instance,
            rate: Some($rate),
        }
    };
}

pub static CATALOG: &[ResourceSpec] = &[
    resource!("light", R, RU),
    resource!("scene", RC, RUD),
    resource!("room", RC, RUD),
    resource!("zone", RC, RUD),
    resource!("bridge_home", R, R),
    resource!("grouped_light", R, RU, GROUPED_LIGHT_RATE),
    resource!("device", R, RUD),
    resource!("bridge", R, RU),
    resource!("device_software_update", R, RU),
    resource!("device_power", R, R),
    resource!("zigbee_connectivity", R, RU),
    resource!("zgp_connectivity", R, RU),
    resource!("zigbee_device_discovery", R, RU),
    resource!("motion", R, RU),
    resource!("service_group", RC, RUD),
    resource!("grouped_motion", R, RU),
    resource!("grouped_light_level", R, RU),
    resource!("camera_motion", R, RU),
    resource!("temperature", R, RU),
    resource!("light_level", R, RU),
    resource!("button", R, RU),
    resource!("relative_rotary", R, RU),
    resource!("behavior_script", R, R),
    resource!("behavior_instance", RC, RUD),
    resource!("geofence_client", RC, RUD),
    resource!("geolocation", R, RU),
    resource!("entertainment_configuration", RC, RUD),
    resource!("entertainment", R, RU),
    resource!("homekit", R, RU),
    resource!("matter", R, RU),
    resource!("matter_fabric", R, RD),
    resource!("smart_scene", RC, RUD),
    resource!("contact", R, RU),
    resource!("tamper", R, R),
];

// ── Lookups ──────────────────────────────────────────────────────────

pub fn lookup(resource_type: &str) -> Option<&'static ResourceSpec> {
    CATALOG.iter().find(|spec| spec.resource_type == resource_type)
}

pub fn contains(resource_type: &str) -> bool {
    lookup(resource_type).is_some()
}

/// Validate `method` against the catalog and return the matching entry.
pub fn check(
    resource_type: &str,
    method: HttpMethod,
    id: Option<&str>,
) -> Result<&'static ResourceSpec, Error> {
    let spec = lookup(resource_type).ok_or_else(|| Error::UnknownResource(resource_type.into()))?;
    let scope = if id.is_some() {
        Scope::Instance
    } else {
        Scope::Collection
    };
    if spec.allows(method, scope) {
        Ok(spec)
    } else {
        Err(Error::MethodNotAllowed {
            resource_type: resource_type.into(),
            method: method.to_string(),
            scope: scope.as_str(),
        })
    }
}
