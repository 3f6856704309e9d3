//! Legacy policy conversion: flat fields -> Group/Section representation.
//!
//! Older policies carried a flat [`PolicyFields`] struct instead of
//! sections. [`convert_fields`] migrates that struct field by field through
//! a fixed, ordered list of converter functions; the list order determines
//! group order in the output section, so conversion is deterministic. A
//! payload that produces no groups converts to `None`, never to an empty
//! section.
//!
//! Conversion is pure: no I/O, no failure paths. The one historically
//! panicking path (an unrecognized numeric comparator) is unrepresentable
//! here because [`Comparator`] is a closed enum.

use serde::{Deserialize, Serialize};

use crate::policy::{Policy, PolicyGroup, PolicySection, PolicyValue, CURRENT_VERSION};
use crate::registry::field_names;

/// The legacy flat-fields policy payload.
///
/// Every member is optional; an unset member contributes no groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFields {
    pub image_name: Option<ImageNamePolicy>,
    pub image_age_days: Option<i64>,
    pub cve: Option<String>,
    pub component: Option<ComponentPolicy>,
    pub scan_age_days: Option<i64>,
    pub no_scan_exists: Option<bool>,
    pub env: Option<EnvPolicy>,
    pub volume_policy: Option<VolumePolicy>,
    pub port_policy: Option<PortPolicy>,
    pub required_label: Option<KeyValuePolicy>,
    pub required_annotation: Option<KeyValuePolicy>,
    pub disallowed_annotation: Option<KeyValuePolicy>,
    pub required_image_label: Option<KeyValuePolicy>,
    pub disallowed_image_label: Option<KeyValuePolicy>,
    pub privileged: Option<bool>,
    pub add_capabilities: Vec<String>,
    pub drop_capabilities: Vec<String>,
    pub process_policy: Option<ProcessPolicy>,
    pub host_mount_read_only: Option<bool>,
    pub whitelist_enabled: Option<bool>,
    pub fixed_by: Option<String>,
    pub read_only_root_fs: Option<bool>,
    pub cvss: Option<NumericalPolicy>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageNamePolicy {
    pub registry: String,
    pub remote: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentPolicy {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvPolicy {
    pub env_var_source: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyValuePolicy {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPolicy {
    pub name: String,
    pub ancestor: String,
    pub args: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumePolicy {
    pub name: String,
    pub source: String,
    pub destination: String,
    pub volume_type: String,
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortPolicy {
    pub port: u16,
    pub protocol: String,
}

/// Numeric comparison in a legacy policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericalPolicy {
    pub op: Comparator,
    pub value: f64,
}

/// Closed set of numeric comparators. No invalid value is constructible,
/// so conversion has no unrecognized-comparator path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Equals,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Equals => "=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanOrEquals => ">=",
            Comparator::LessThan => "<",
            Comparator::LessThanOrEquals => "<=",
        }
    }
}

type FieldConverter = fn(&PolicyFields) -> Vec<PolicyGroup>;

// Order here is load-bearing: it fixes group order in the converted section.
const FIELD_CONVERTERS: &[FieldConverter] = &[
    convert_image_name,
    convert_image_age_days,
    convert_cve,
    convert_component,
    convert_scan_age_days,
    convert_no_scan_exists,
    convert_env,
    convert_volume_policy,
    convert_port_policy,
    convert_required_label,
    convert_required_annotation,
    convert_disallowed_annotation,
    convert_required_image_label,
    convert_disallowed_image_label,
    convert_privileged,
    convert_add_capabilities,
    convert_drop_capabilities,
    convert_process_policy,
    convert_host_mount_policy,
    convert_whitelist_enabled,
    convert_fixed_by,
    convert_read_only_root_fs,
    convert_cvss,
];

/// Convert a legacy fields payload into a section, or `None` when no field
/// is set. Pure and deterministic.
pub fn convert_fields(fields: &PolicyFields) -> Option<PolicySection> {
    let groups: Vec<PolicyGroup> = FIELD_CONVERTERS
        .iter()
        .flat_map(|convert| convert(fields))
        .collect();

    if groups.is_empty() {
        return None;
    }
    Some(PolicySection {
        section_name: String::new(),
        groups,
    })
}

/// Return a clone of the policy, upgraded if it is a legacy policy.
///
/// An already-current policy is returned unchanged; the converter is never
/// applied to it.
pub fn ensure_converted(policy: &Policy) -> Policy {
    let mut converted = policy.clone();
    if converted.is_legacy() {
        converted.version = CURRENT_VERSION.to_string();
        if let Some(section) = converted.fields.as_ref().and_then(|f| convert_fields(f)) {
            converted.sections.push(section);
        }
        converted.fields = None;
    }
    converted
}

fn group(field_name: &str, values: Vec<PolicyValue>) -> PolicyGroup {
    PolicyGroup {
        field_name: field_name.to_string(),
        values,
        ..Default::default()
    }
}

fn single_value_group(field_name: &str, value: impl ToString) -> PolicyGroup {
    group(field_name, vec![PolicyValue::new(value.to_string())])
}

fn convert_image_name(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.image_name else {
        return vec![];
    };

    let mut groups = Vec::new();
    if !p.registry.is_empty() {
        groups.push(single_value_group(field_names::IMAGE_REGISTRY, &p.registry));
    }
    if !p.remote.is_empty() {
        groups.push(single_value_group(field_names::IMAGE_REMOTE, &p.remote));
    }
    if !p.tag.is_empty() {
        groups.push(single_value_group(field_names::IMAGE_TAG, &p.tag));
    }
    groups
}

fn convert_image_age_days(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.image_age_days {
        Some(days) => vec![single_value_group(field_names::IMAGE_AGE, days)],
        None => vec![],
    }
}

fn convert_cve(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.cve.as_deref() {
        Some(cve) if !cve.is_empty() => vec![single_value_group(field_names::CVE, cve)],
        _ => vec![],
    }
}

fn convert_component(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.component else {
        return vec![];
    };
    vec![single_value_group(
        field_names::IMAGE_COMPONENT,
        format!("{}={}", p.name, p.version),
    )]
}

fn convert_scan_age_days(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.scan_age_days {
        Some(days) => vec![single_value_group(field_names::IMAGE_SCAN_AGE, days)],
        None => vec![],
    }
}

fn convert_no_scan_exists(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.no_scan_exists {
        Some(v) => vec![single_value_group(field_names::UNSCANNED_IMAGE, v)],
        None => vec![],
    }
}

fn convert_env(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.env else {
        return vec![];
    };
    vec![single_value_group(
        field_names::ENVIRONMENT_VARIABLE,
        format!("{}={}={}", p.env_var_source, p.key, p.value),
    )]
}

fn convert_volume_policy(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.volume_policy else {
        return vec![];
    };

    let mut groups = Vec::new();
    if !p.name.is_empty() {
        groups.push(single_value_group(field_names::VOLUME_NAME, &p.name));
    }
    if !p.volume_type.is_empty() {
        groups.push(single_value_group(field_names::VOLUME_TYPE, &p.volume_type));
    }
    if !p.destination.is_empty() {
        groups.push(single_value_group(
            field_names::VOLUME_DESTINATION,
            &p.destination,
        ));
    }
    if !p.source.is_empty() {
        groups.push(single_value_group(field_names::VOLUME_SOURCE, &p.source));
    }
    if let Some(read_only) = p.read_only {
        groups.push(single_value_group(field_names::WRITABLE_VOLUME, !read_only));
    }
    groups
}

fn convert_port_policy(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.port_policy else {
        return vec![];
    };

    let mut groups = Vec::new();
    if p.port != 0 {
        groups.push(single_value_group(field_names::PORT, p.port));
    }
    if !p.protocol.is_empty() {
        groups.push(single_value_group(field_names::PROTOCOL, &p.protocol));
    }
    groups
}

fn convert_key_value(
    policy: &Option<KeyValuePolicy>,
    field_name: &'static str,
) -> Vec<PolicyGroup> {
    match policy {
        Some(p) => vec![single_value_group(
            field_name,
            format!("{}={}", p.key, p.value),
        )],
        None => vec![],
    }
}

fn convert_required_label(fields: &PolicyFields) -> Vec<PolicyGroup> {
    convert_key_value(&fields.required_label, field_names::REQUIRED_LABEL)
}

fn convert_required_annotation(fields: &PolicyFields) -> Vec<PolicyGroup> {
    convert_key_value(&fields.required_annotation, field_names::REQUIRED_ANNOTATION)
}

fn convert_disallowed_annotation(fields: &PolicyFields) -> Vec<PolicyGroup> {
    convert_key_value(
        &fields.disallowed_annotation,
        field_names::DISALLOWED_ANNOTATION,
    )
}

fn convert_required_image_label(fields: &PolicyFields) -> Vec<PolicyGroup> {
    convert_key_value(
        &fields.required_image_label,
        field_names::REQUIRED_IMAGE_LABEL,
    )
}

fn convert_disallowed_image_label(fields: &PolicyFields) -> Vec<PolicyGroup> {
    convert_key_value(
        &fields.disallowed_image_label,
        field_names::DISALLOWED_IMAGE_LABEL,
    )
}

fn convert_privileged(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.privileged {
        Some(v) => vec![single_value_group(field_names::PRIVILEGED, v)],
        None => vec![],
    }
}

fn convert_add_capabilities(fields: &PolicyFields) -> Vec<PolicyGroup> {
    if fields.add_capabilities.is_empty() {
        return vec![];
    }
    vec![group(
        field_names::ADD_CAPABILITIES,
        fields
            .add_capabilities
            .iter()
            .map(PolicyValue::new)
            .collect(),
    )]
}

fn convert_drop_capabilities(fields: &PolicyFields) -> Vec<PolicyGroup> {
    if fields.drop_capabilities.is_empty() {
        return vec![];
    }
    vec![group(
        field_names::DROP_CAPABILITIES,
        fields
            .drop_capabilities
            .iter()
            .map(PolicyValue::new)
            .collect(),
    )]
}

fn convert_process_policy(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.process_policy else {
        return vec![];
    };

    let mut groups = Vec::new();
    if !p.name.is_empty() {
        groups.push(single_value_group(field_names::PROCESS_NAME, &p.name));
    }
    if !p.ancestor.is_empty() {
        groups.push(single_value_group(field_names::PROCESS_ANCESTOR, &p.ancestor));
    }
    if !p.args.is_empty() {
        groups.push(single_value_group(field_names::PROCESS_ARGUMENTS, &p.args));
    }
    if !p.uid.is_empty() {
        groups.push(single_value_group(field_names::PROCESS_UID, &p.uid));
    }
    groups
}

fn convert_host_mount_policy(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.host_mount_read_only {
        Some(read_only) => vec![single_value_group(
            field_names::WRITABLE_HOST_MOUNT,
            !read_only,
        )],
        None => vec![],
    }
}

fn convert_whitelist_enabled(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.whitelist_enabled {
        Some(v) => vec![single_value_group(field_names::UNEXPECTED_PROCESS, v)],
        None => vec![],
    }
}

fn convert_fixed_by(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.fixed_by.as_deref() {
        Some(fixed_by) if !fixed_by.is_empty() => {
            vec![single_value_group(field_names::FIXED_BY, fixed_by)]
        }
        _ => vec![],
    }
}

fn convert_read_only_root_fs(fields: &PolicyFields) -> Vec<PolicyGroup> {
    match fields.read_only_root_fs {
        Some(v) => vec![single_value_group(field_names::READ_ONLY_ROOT_FS, v)],
        None => vec![],
    }
}

fn convert_cvss(fields: &PolicyFields) -> Vec<PolicyGroup> {
    let Some(p) = &fields.cvss else {
        return vec![];
    };
    vec![single_value_group(
        field_names::CVSS,
        format!("{} {:.6}", p.op.symbol(), p.value),
    )]
}
