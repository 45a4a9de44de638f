//! Sample chart data
//!
//! Patient `1` has a full chart across every loading tier; patient `2` has a
//! smaller one so subject switches have something to load.

use chartcache::resource::patient_reference;
use chartcache::{Resource, ResourceType};
use serde_json::{json, Value};

fn owned(resource_type: ResourceType, id: &str, subject: &str, mut fields: Value) -> Resource {
    let field = resource_type.subject_field().unwrap_or("subject");
    if let Value::Object(map) = &mut fields {
        map.insert(field.to_string(), patient_reference(subject));
    }
    Resource::new(resource_type, id, fields)
}

pub fn patient(id: &str, given: &str, family: &str) -> Resource {
    Resource::new(
        ResourceType::Patient,
        id,
        json!({"name": [{"given": [given], "family": family}], "gender": "unknown"}),
    )
}

pub fn condition(id: &str, subject: &str, text: &str) -> Resource {
    owned(
        ResourceType::Condition,
        id,
        subject,
        json!({"code": {"text": text}, "clinicalStatus": "active"}),
    )
}

pub fn encounter(id: &str, subject: &str, status: &str, start: &str) -> Resource {
    owned(
        ResourceType::Encounter,
        id,
        subject,
        json!({"status": status, "period": {"start": start}}),
    )
}

pub fn observation(id: &str, subject: &str, date: &str) -> Resource {
    owned(
        ResourceType::Observation,
        id,
        subject,
        json!({
            "status": "final",
            "code": {"text": "Heart rate"},
            "effectiveDateTime": date,
            "valueQuantity": {"value": 60 + fastrand::u32(0..40), "unit": "/min"}
        }),
    )
}

/// Resources of patient `1`: two of each critical type, observations,
/// and one resource of every important and optional type
pub fn patient_one() -> Vec<Resource> {
    let s = "1";
    let mut chart = vec![
        patient(s, "Ada", "Lovelace"),
        encounter("enc-1", s, "finished", "2024-01-10"),
        encounter("enc-2", s, "in-progress", "2024-06-01"),
        condition("123", s, "Hypertension"),
        condition("124", s, "Asthma"),
        owned(
            ResourceType::MedicationRequest,
            "med-1",
            s,
            json!({"status": "active", "authoredOn": "2024-02-01"}),
        ),
        owned(
            ResourceType::AllergyIntolerance,
            "alg-1",
            s,
            json!({"code": {"text": "Penicillin"}}),
        ),
        owned(ResourceType::Procedure, "proc-1", s, json!({"status": "completed"})),
        owned(
            ResourceType::DiagnosticReport,
            "dr-1",
            s,
            json!({"status": "final", "issued": "2024-03-01"}),
        ),
        owned(ResourceType::Coverage, "cov-1", s, json!({"status": "active"})),
        owned(ResourceType::Immunization, "imm-1", s, json!({"status": "completed"})),
        owned(ResourceType::CarePlan, "cp-1", s, json!({"status": "active"})),
        owned(ResourceType::CareTeam, "ct-1", s, json!({"status": "active"})),
        owned(
            ResourceType::DocumentReference,
            "doc-1",
            s,
            json!({"status": "current", "date": "2024-04-01"}),
        ),
        owned(ResourceType::ImagingStudy, "img-1", s, json!({"status": "available"})),
    ];
    for day in 1..=5 {
        chart.push(observation(
            &format!("obs-{}", day),
            s,
            &format!("2024-05-0{}", day),
        ));
    }
    chart
}

pub fn patient_two() -> Vec<Resource> {
    vec![
        patient("2", "Grace", "Hopper"),
        encounter("enc-20", "2", "finished", "2023-11-11"),
        condition("200", "2", "Migraine"),
        observation("obs-20", "2", "2023-11-11"),
    ]
}

/// Every resource of the sample chart
pub fn full_chart() -> Vec<Resource> {
    let mut chart = patient_one();
    chart.extend(patient_two());
    chart
}

/// Number of resources patient `1` has outside the Patient record itself
pub const PATIENT_ONE_RESOURCES: usize = 19;
