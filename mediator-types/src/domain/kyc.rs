use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::require_text;
use super::user::UserId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a KYC profile.
    KycProfileId
);

text_enum!(
    DocumentType {
        Passport => "passport",
        NationalId => "national_id",
        DrivingLicense => "driving_license",
    }
);

text_enum!(
    /// Verification outcome. Only `Pending` profiles may change.
    KycStatus {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
    }
);

/// Know-Your-Customer identity record, one per user.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct KycProfile {
    pub id: KycProfileId,
    pub user_id: UserId,
    pub full_name: String,
    pub mobile_number: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub document_type: DocumentType,
    pub document_number: String,
    pub status: KycStatus,
    pub rejection_reason: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity details submitted for verification.
#[derive(Debug, Clone)]
pub struct KycDetails {
    pub full_name: String,
    pub mobile_number: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub document_type: DocumentType,
    pub document_number: String,
}

impl KycDetails {
    pub fn validate(&self, today: NaiveDate) -> Result<(), DomainError> {
        require_text("full_name", &self.full_name, 255)?;
        require_text("address", &self.address, 500)?;
        require_text("document_number", &self.document_number, 50)?;
        validate_mobile(&self.mobile_number)?;
        if self.date_of_birth >= today {
            return Err(DomainError::validation("date_of_birth must be in the past"));
        }
        Ok(())
    }
}

/// Digits with an optional leading `+`, 7 to 15 digits long.
pub fn validate_mobile(mobile: &str) -> Result<(), DomainError> {
    let digits = mobile.strip_prefix('+').unwrap_or(mobile);
    if (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "Invalid mobile number: {}",
            mobile
        )))
    }
}

impl KycProfile {
    pub fn new(
        user_id: UserId,
        details: KycDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        details.validate(now.date_naive())?;
        Ok(Self {
            id: KycProfileId::new(),
            user_id,
            full_name: details.full_name,
            mobile_number: details.mobile_number,
            date_of_birth: details.date_of_birth,
            address: details.address,
            document_type: details.document_type,
            document_number: details.document_number,
            status: KycStatus::Pending,
            rejection_reason: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the submitted details while verification is still pending.
    pub fn amend(&mut self, details: KycDetails, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != KycStatus::Pending {
            return Err(DomainError::validation(
                "KYC details can only be changed while pending",
            ));
        }
        details.validate(now.date_naive())?;
        self.full_name = details.full_name;
        self.mobile_number = details.mobile_number;
        self.date_of_birth = details.date_of_birth;
        self.address = details.address;
        self.document_type = details.document_type;
        self.document_number = details.document_number;
        self.updated_at = now;
        Ok(())
    }

    /// Returns the details as currently recorded.
    pub fn details(&self) -> KycDetails {
        KycDetails {
            full_name: self.full_name.clone(),
            mobile_number: self.mobile_number.clone(),
            date_of_birth: self.date_of_birth,
            address: self.address.clone(),
            document_type: self.document_type,
            document_number: self.document_number.clone(),
        }
    }

    pub fn verify(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_pending(KycStatus::Verified)?;
        self.status = KycStatus::Verified;
        self.verified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_pending(KycStatus::Rejected)?;
        require_text("reason", &reason, 500)?;
        self.status = KycStatus::Rejected;
        self.rejection_reason = Some(reason);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self, to: KycStatus) -> Result<(), DomainError> {
        if self.status != KycStatus::Pending {
            return Err(DomainError::transition("kyc profile", self.status, to));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> KycDetails {
        KycDetails {
            full_name: "Alice Sharma".into(),
            mobile_number: "+9779800000000".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 1).unwrap(),
            address: "Kathmandu".into(),
            document_type: DocumentType::NationalId,
            document_number: "NID-123".into(),
        }
    }

    #[test]
    fn test_verify_only_from_pending() {
        let now = Utc::now();
        let mut kyc = KycProfile::new(UserId::new(), details(), now).unwrap();
        kyc.verify(now).unwrap();
        assert_eq!(kyc.status, KycStatus::Verified);
        assert!(kyc.verified_at.is_some());
        assert!(kyc.reject("too late".into(), now).is_err());
    }

    #[test]
    fn test_amend_after_verification_rejected() {
        let now = Utc::now();
        let mut kyc = KycProfile::new(UserId::new(), details(), now).unwrap();
        kyc.verify(now).unwrap();
        assert!(kyc.amend(details(), now).is_err());
    }

    #[test]
    fn test_invalid_mobile_rejected() {
        assert!(validate_mobile("98-000").is_err());
        assert!(validate_mobile("+9779800000000").is_ok());
    }

    #[test]
    fn test_future_birth_date_rejected() {
        let now = Utc::now();
        let mut d = details();
        d.date_of_birth = now.date_naive();
        assert!(KycProfile::new(UserId::new(), d, now).is_err());
    }
}
