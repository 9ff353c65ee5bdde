use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Reads a uuid claim such as `patient_id` from `app_metadata`.
    pub fn app_metadata_uuid(&self, key: &str) -> Option<Uuid> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(|value| value.as_str())
            .and_then(|value| Uuid::parse_str(value).ok())
    }

    /// Role from `app_metadata.role`, falling back to the top-level claim.
    pub fn effective_role(&self) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Receptionist,
    #[serde(alias = "medico", alias = "Medico")]
    Doctor,
    #[serde(alias = "paziente", alias = "Paziente")]
    Patient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Receptionist => write!(f, "receptionist"),
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "receptionist" => Ok(Role::Receptionist),
            "doctor" | "medico" => Ok(Role::Doctor),
            "patient" | "paziente" => Ok(Role::Patient),
            other => Err(AppError::Forbidden(format!("Unknown role: {}", other))),
        }
    }
}

/// An already-authenticated caller as seen by the scheduling core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub role: Role,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            patient_id: None,
            doctor_id: None,
        }
    }

    pub fn with_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Patients may only act on their own records; every other role passes.
    pub fn may_act_for_patient(&self, patient_id: Uuid) -> bool {
        match self.role {
            Role::Patient => self.patient_id == Some(patient_id),
            Role::Admin | Role::Receptionist | Role::Doctor => true,
        }
    }
}

impl TryFrom<&User> for CallerContext {
    type Error = AppError;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let role: Role = user
            .role
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Caller has no role".to_string()))?
            .parse()?;

        // Supabase users carry their own id as the patient/doctor id unless
        // the token says otherwise.
        let own_id = Uuid::parse_str(&user.id).ok();
        let patient_id = user
            .patient_id
            .or_else(|| if role == Role::Patient { own_id } else { None });
        let doctor_id = user
            .doctor_id
            .or_else(|| if role == Role::Doctor { own_id } else { None });

        Ok(Self {
            user_id: user.id.clone(),
            role,
            patient_id,
            doctor_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Option<&str>) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: Some("someone@example.com".to_string()),
            role: role.map(str::to_string),
            patient_id: None,
            doctor_id: None,
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn parses_italian_role_names() {
        assert_eq!("Medico".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!("Paziente".parse::<Role>().unwrap(), Role::Patient);
        assert_eq!("Receptionist".parse::<Role>().unwrap(), Role::Receptionist);
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn patient_caller_defaults_to_own_id() {
        let user = user(Some("patient"));
        let caller = CallerContext::try_from(&user).unwrap();

        assert_eq!(caller.role, Role::Patient);
        assert_eq!(caller.patient_id, Uuid::parse_str(&user.id).ok());
        assert_eq!(caller.doctor_id, None);
    }

    #[test]
    fn explicit_claims_win_over_user_id() {
        let mut user = user(Some("doctor"));
        let doctor_id = Uuid::new_v4();
        user.doctor_id = Some(doctor_id);

        let caller = CallerContext::try_from(&user).unwrap();
        assert_eq!(caller.doctor_id, Some(doctor_id));
    }

    #[test]
    fn missing_role_is_forbidden() {
        let result = CallerContext::try_from(&user(None));
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn only_patients_are_restricted_to_themselves() {
        let own = Uuid::new_v4();
        let patient = CallerContext::new("p", Role::Patient).with_patient(own);
        assert!(patient.may_act_for_patient(own));
        assert!(!patient.may_act_for_patient(Uuid::new_v4()));

        let receptionist = CallerContext::new("r", Role::Receptionist);
        assert!(receptionist.may_act_for_patient(own));
    }

    #[test]
    fn reads_app_metadata_claims() {
        let patient_id = Uuid::new_v4();
        let claims = JwtClaims {
            sub: "user".to_string(),
            exp: None,
            email: None,
            role: Some("authenticated".to_string()),
            app_metadata: Some(serde_json::json!({
                "role": "Paziente",
                "patient_id": patient_id.to_string(),
            })),
            user_metadata: None,
            aud: None,
            iat: None,
        };

        assert_eq!(claims.app_metadata_uuid("patient_id"), Some(patient_id));
        assert_eq!(claims.app_metadata_uuid("doctor_id"), None);
        assert_eq!(claims.effective_role().as_deref(), Some("Paziente"));
    }
}
