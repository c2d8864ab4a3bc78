use std::collections::{HashMap, HashSet};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::application::services::change_detector::content_hash;
use crate::application::services::reverse_sync::PortalBaseline;
use crate::domain::entities::{
    CommitteeRecord, MemberRecord, NewTrackedRow, ParentRecord, SourceRecord, SourceSnapshot,
    TeamRecord,
};
use crate::domain::value_objects::{EntityKind, NaturalKey, PortalPage};
use crate::shared::error::{AppError, Result};

/// Member data that is synced outside the plain payload path: the portrait
/// attachment and the family links resolved after reconciliation.
pub struct MemberExtras {
    pub key: NaturalKey,
    pub photo: Option<Vec<u8>>,
    pub parent_keys: Vec<NaturalKey>,
}

/// Everything one snapshot contributes to a run: tracked rows per kind,
/// member follow-up material, and the portal field baseline the reverse
/// sync diffs against.
pub struct SnapshotBatches {
    rows: HashMap<EntityKind, Vec<NewTrackedRow>>,
    pub member_extras: Vec<MemberExtras>,
    pub baseline: PortalBaseline,
}

impl SnapshotBatches {
    pub fn rows_for(&self, kind: EntityKind) -> &[NewTrackedRow] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn keys_for(&self, kind: EntityKind) -> HashSet<NaturalKey> {
        self.rows_for(kind)
            .iter()
            .map(|row| row.key.clone())
            .collect()
    }
}

/// Flattens the snapshot into per-kind tracked rows. Parents and helpdesk
/// customers and work history assignments are derived from member records;
/// the rest map one to one.
pub fn build(snapshot: &SourceSnapshot) -> Result<SnapshotBatches> {
    let mut rows: HashMap<EntityKind, Vec<NewTrackedRow>> = HashMap::new();
    let mut parents: HashMap<NaturalKey, NewTrackedRow> = HashMap::new();
    let mut member_extras = Vec::new();
    let mut baseline = PortalBaseline::new();

    for record in &snapshot.records {
        match record {
            SourceRecord::Member(member) => {
                let key = NaturalKey::new(&member.member_number);
                rows.entry(EntityKind::Member)
                    .or_default()
                    .push(tracked_row(key.clone(), member_payload(member)?, None)?);

                if let Some(email) = &member.email {
                    rows.entry(EntityKind::HelpdeskCustomer).or_default().push(
                        tracked_row(
                            NaturalKey::new(email.to_lowercase()),
                            customer_payload(member),
                            None,
                        )?,
                    );
                }

                for (index, assignment) in member.teams.iter().enumerate() {
                    rows.entry(EntityKind::WorkHistory).or_default().push(
                        tracked_row(
                            NaturalKey::composite(&member.member_number, &assignment.team),
                            json!({
                                "member_number": member.member_number,
                                "team": assignment.team,
                                "role": assignment.role,
                                "since": assignment.since,
                            }),
                            Some(index as i64),
                        )?,
                    );
                }

                let mut parent_keys = Vec::new();
                for parent in &member.parents {
                    let key = parent_key(member, parent);
                    parent_keys.push(key.clone());
                    // Same contact address plus same display name is the
                    // same person; anything less stays a separate record.
                    parents
                        .entry(key.clone())
                        .or_insert(tracked_row(key, parent_payload(parent), None)?);
                }

                collect_baseline(&mut baseline, member);
                member_extras.push(MemberExtras {
                    key,
                    photo: decode_photo(member)?,
                    parent_keys,
                });
            }
            SourceRecord::Team(team) => {
                rows.entry(EntityKind::Team).or_default().push(tracked_row(
                    NaturalKey::new(&team.name),
                    team_payload(team),
                    None,
                )?);
            }
            SourceRecord::Committee(committee) => {
                rows.entry(EntityKind::Committee)
                    .or_default()
                    .push(tracked_row(
                        NaturalKey::new(&committee.name),
                        committee_payload(committee),
                        None,
                    )?);
            }
            SourceRecord::ImportantDate(date) => {
                rows.entry(EntityKind::ImportantDate)
                    .or_default()
                    .push(tracked_row(
                        NaturalKey::composite(&date.title, &date.date),
                        json!({
                            "title": date.title,
                            "date": date.date,
                            "description": date.description,
                        }),
                        None,
                    )?);
            }
        }
    }

    rows.entry(EntityKind::Parent)
        .or_default()
        .extend(parents.into_values());

    Ok(SnapshotBatches {
        rows,
        member_extras,
        baseline,
    })
}

fn tracked_row(key: NaturalKey, payload: Value, position: Option<i64>) -> Result<NewTrackedRow> {
    Ok(NewTrackedRow {
        source_hash: content_hash(&payload)?,
        key,
        payload,
        position,
    })
}

fn member_payload(member: &MemberRecord) -> Result<Value> {
    let mut payload = json!({
        "member_number": member.member_number,
        "first_name": member.first_name,
        "last_name": member.last_name,
        "email": member.email,
        "phone": member.phone,
        "birth_date": member.birth_date,
        "address": {
            "street": member.street,
            "postal_code": member.postal_code,
            "city": member.city,
        },
        "teams": member
            .teams
            .iter()
            .map(|t| json!({"team": t.team, "role": t.role}))
            .collect::<Vec<_>>(),
    });
    // A changed portrait must change the member hash even though the bytes
    // travel as an attachment, not in the payload.
    if let Some(photo) = &member.photo {
        let bytes = BASE64
            .decode(photo)
            .map_err(|err| AppError::Serialization(format!("member photo: {err}")))?;
        payload["photo_digest"] = Value::String(hex::encode(Sha256::digest(&bytes)));
    }
    Ok(payload)
}

fn customer_payload(member: &MemberRecord) -> Value {
    json!({
        "email": member.email.as_deref().map(str::to_lowercase),
        "name": member.full_name(),
        "member_number": member.member_number,
    })
}

fn parent_payload(parent: &ParentRecord) -> Value {
    json!({
        "name": parent.full_name(),
        "first_name": parent.first_name,
        "last_name": parent.last_name,
        "email": parent.email.as_deref().map(str::to_lowercase),
        "phone": parent.phone,
    })
}

fn team_payload(team: &TeamRecord) -> Value {
    json!({
        "name": team.name,
        "category": team.category,
        "season": team.season,
    })
}

fn committee_payload(committee: &CommitteeRecord) -> Value {
    json!({
        "name": committee.name,
        "description": committee.description,
        "members": committee.members,
    })
}

fn parent_key(member: &MemberRecord, parent: &ParentRecord) -> NaturalKey {
    match &parent.email {
        Some(email) => NaturalKey::composite(email.to_lowercase(), parent.full_name()),
        // No contact address to correlate on: scope the parent to the member.
        None => NaturalKey::composite(
            format!("member:{}", member.member_number),
            parent.full_name(),
        ),
    }
}

fn decode_photo(member: &MemberRecord) -> Result<Option<Vec<u8>>> {
    member
        .photo
        .as_ref()
        .map(|photo| {
            BASE64
                .decode(photo)
                .map_err(|err| AppError::Serialization(format!("member photo: {err}")))
        })
        .transpose()
}

fn collect_baseline(baseline: &mut PortalBaseline, member: &MemberRecord) {
    let fields: [(PortalPage, &str, Option<&String>); 7] = [
        (PortalPage::General, "first_name", Some(&member.first_name)),
        (PortalPage::General, "last_name", Some(&member.last_name)),
        (PortalPage::Contact, "email", member.email.as_ref()),
        (PortalPage::Contact, "phone", member.phone.as_ref()),
        (PortalPage::Contact, "street", member.street.as_ref()),
        (PortalPage::Contact, "city", member.city.as_ref()),
        (PortalPage::Financial, "iban", member.iban.as_ref()),
    ];
    for (page, field, value) in fields {
        if let Some(value) = value {
            baseline.insert(
                (member.member_number.clone(), page, field.to_string()),
                value.clone(),
            );
        }
    }
}
