use assert_json_diff::assert_json_include;
use iab_tcf::v2::{Core, PubRestriction, PublisherTc};
use iab_tcf::{Consent, ConsentV1, ConsentV2, VendorSet};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs::File;
use std::io;
use std::io::ErrorKind;
use std::path::Path;

/// A consent string with either the fields it decodes to, or the error it fails with.
///
/// Timestamps are given in deciseconds since the epoch, flags as lists of 1-based ids.
#[derive(Deserialize)]
pub struct Fixture {
    consent_string: String,
    #[serde(default)]
    canonical: bool,
    expected: Option<Value>,
    error: Option<String>,
}

impl Fixture {
    pub fn load_from_file<P: AsRef<Path>>(p: P) -> io::Result<Self> {
        let f = File::open(p)?;
        let fixture: Self = serde_json::from_reader(&f)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;
        Ok(fixture)
    }

    pub fn assert_matches(&self) {
        let parsed = iab_tcf::parse(&self.consent_string);

        if let Some(error) = &self.error {
            let err = parsed.expect_err("consent string should not parse");
            assert_eq!(&format!("{err:?}"), error);
            assert!(iab_tcf::validate(&self.consent_string).is_err());
            return;
        }

        let consent = match parsed {
            Ok(consent) => consent,
            Err(e) => panic!("consent string decode error: {e}"),
        };
        if let Some(expected) = &self.expected {
            assert_json_include!(actual: describe(&consent), expected: expected);
        }

        let encoded = consent.to_string();
        if self.canonical {
            assert_eq!(encoded, self.consent_string);
        }
        assert_eq!(iab_tcf::parse(&encoded), Ok(consent));
    }
}

fn describe(consent: &Consent) -> Value {
    match consent {
        Consent::V1(c) => describe_v1(c),
        Consent::V2(c) => describe_v2(c),
    }
}

fn describe_v1(c: &ConsentV1) -> Value {
    json!({
        "version": 1,
        "created": deciseconds(&c.created),
        "last_updated": deciseconds(&c.last_updated),
        "cmp_id": c.cmp_id,
        "cmp_version": c.cmp_version,
        "consent_screen": c.consent_screen,
        "consent_language": c.consent_language,
        "vendor_list_version": c.vendor_list_version,
        "purposes_allowed": ids(&c.purposes_allowed),
        "vendor_consents": vendors(&c.vendor_consents),
    })
}

fn describe_v2(c: &ConsentV2) -> Value {
    json!({
        "version": 2,
        "core": core(&c.core),
        "disclosed_vendors": c.disclosed_vendors.as_ref().map(vendors),
        "allowed_vendors": c.allowed_vendors.as_ref().map(vendors),
        "publisher_tc": c.publisher_tc.as_ref().map(publisher_tc),
    })
}

fn core(c: &Core) -> Value {
    json!({
        "created": deciseconds(&c.created),
        "last_updated": deciseconds(&c.last_updated),
        "cmp_id": c.cmp_id,
        "cmp_version": c.cmp_version,
        "consent_screen": c.consent_screen,
        "consent_language": c.consent_language,
        "vendor_list_version": c.vendor_list_version,
        "policy_version": c.policy_version,
        "is_service_specific": c.is_service_specific,
        "use_non_standard_stacks": c.use_non_standard_stacks,
        "special_feature_optins": ids(&c.special_feature_optins),
        "purpose_consents": ids(&c.purpose_consents),
        "purpose_legitimate_interests": ids(&c.purpose_legitimate_interests),
        "purpose_one_treatment": c.purpose_one_treatment,
        "publisher_country_code": c.publisher_country_code,
        "vendor_consents": vendors(&c.vendor_consents),
        "vendor_legitimate_interests": vendors(&c.vendor_legitimate_interests),
        "publisher_restrictions": c.publisher_restrictions.iter().map(restriction).collect::<Vec<_>>(),
    })
}

fn restriction(r: &PubRestriction) -> Value {
    json!({
        "purpose_id": r.purpose_id,
        "restriction_type": r.restriction_type.to_string(),
        "vendors": vendors(&r.vendors),
    })
}

fn publisher_tc(p: &PublisherTc) -> Value {
    json!({
        "purpose_consents": ids(&p.purpose_consents),
        "purpose_legitimate_interests": ids(&p.purpose_legitimate_interests),
        "custom_purpose_consents": ids(&p.custom_purpose_consents),
        "custom_purpose_legitimate_interests": ids(&p.custom_purpose_legitimate_interests),
    })
}

fn vendors(v: &VendorSet) -> Value {
    json!({
        "max_vendor_id": v.max_vendor_id(),
        "ids": v.iter().collect::<Vec<_>>(),
    })
}

fn ids(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter_map(|(i, &b)| b.then_some(i + 1))
        .collect()
}

fn deciseconds(t: &time::OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 100_000_000) as i64
}
