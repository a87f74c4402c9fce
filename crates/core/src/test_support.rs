//! Shared fixtures for unit tests: a representative prescription and a small PKI.
//!
//! Key generation is slow, so the PKI is built once per test binary.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use eps_certificates::{
    CertificateAuthority, IssuedCertificate, PrescriberRequest, RevocationListRequest,
    RevocationReason, RevokedSerial, Validity,
};
use time::OffsetDateTime;

use crate::certificate::CertificateRecord;
use crate::config::TrustConfig;
use crate::prescription::PrescriptionDocument;
use crate::revocation::StaticCrlFetcher;
use crate::signed_info::SigningAlgorithm;
use crate::signing::{sign_document, LocalRsaSigner};

pub(crate) const PRESCRIPTION_ID: &str = "A7B86F8D-1D02-FC28-E050-D20AE3A215F0";
pub(crate) const INTERMEDIATE_CRL_URI: &str = "http://crl.eps.test/intermediate.crl";
pub(crate) const ROOT_CRL_URI: &str = "http://crl.eps.test/root.crl";

/// The author time of [`prescription_xml`].
pub(crate) fn signing_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
}

/// [`prescription_xml`] with one signed field changed, for each signed field.
pub(crate) fn signed_field_edits() -> Vec<(&'static str, String)> {
    let xml = prescription_xml();
    [
        ("author name", "<family>EDWARDS</family>", "<family>EDWARDES</family>"),
        ("patient NHS number", r#"extension="9446041481""#, r#"extension="9446041473""#),
        ("prescription id", PRESCRIPTION_ID, "A7B86F8D-1D02-FC28-E050-D20AE3A215F1"),
        (
            "author time",
            r#"<time value="20240315093000"/>"#,
            r#"<time value="20240315093100"/>"#,
        ),
    ]
    .into_iter()
    .map(|(field, from, to)| {
        assert!(xml.contains(from), "fixture has no {field}");
        (field, xml.replace(from, to))
    })
    .collect()
}

pub(crate) fn prescription_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ParentPrescription xmlns="urn:hl7-org:v3" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" classCode="INFO" moodCode="EVN">
  <id root="0E9B3C2A-58C1-4D5B-9F3E-2B6F2C1D7A10"/>
  <code codeSystem="2.16.840.1.113883.2.1.3.2.4.15" code="163501000000109"/>
  <effectiveTime value="20240315093000"/>
  <recordTarget typeCode="RCT">
    <Patient classCode="PAT">
      <id root="2.16.840.1.113883.2.1.4.1" extension="9446041481"/>
      <addr use="H">
        <streetAddressLine>10 HEATHFIELD</streetAddressLine>
        <streetAddressLine>COBHAM</streetAddressLine>
        <postalCode>KT11 2QY</postalCode>
      </addr>
      <patientPerson classCode="PSN" determinerCode="INSTANCE">
        <name use="L">
          <prefix>MRS</prefix>
          <given>JANE</given>
          <family>SMITH</family>
        </name>
        <administrativeGenderCode code="2"/>
        <birthTime value="19680714"/>
      </patientPerson>
    </Patient>
  </recordTarget>
  <pertinentInformation1 typeCode="PERT" contextConductionInd="true">
    <pertinentPrescription classCode="SBADM" moodCode="RQO">
      <id root="{PRESCRIPTION_ID}"/>
      <id root="2.16.840.1.113883.2.1.3.2.4.18.8" extension="83C40E-A23856-00123C"/>
      <code codeSystem="2.16.840.1.113883.2.1.3.2.4.15" code="225426007"/>
      <effectiveTime nullFlavor="NA"/>
      <author typeCode="AUT" contextControlCode="OP">
        <time value="20240315093000"/>
        <signatureText nullFlavor="NA"/>
        <AgentPerson classCode="AGNT">
          <id root="1.2.826.0.1285.0.2.0.67" extension="100102238986"/>
          <code codeSystem="1.2.826.0.1285.0.2.1.104" code="R8000"/>
          <telecom use="WP" value="tel:01208812760"/>
          <agentPerson classCode="PSN" determinerCode="INSTANCE">
            <id root="1.2.826.0.1285.0.2.1.54" extension="4428981"/>
            <name>
              <prefix>DR</prefix>
              <given>THOMAS</given>
              <family>EDWARDS</family>
            </name>
          </agentPerson>
          <representedOrganization classCode="ORG" determinerCode="INSTANCE">
            <id root="1.2.826.0.1285.0.1.10" extension="A83008"/>
            <name>HALLGARTH SURGERY</name>
          </representedOrganization>
        </AgentPerson>
      </author>
      <pertinentInformation5 typeCode="PERT" contextConductionInd="true">
        <seperatableInd value="false"/>
        <pertinentPrescriptionTreatmentType classCode="OBS" moodCode="EVN">
          <code codeSystem="2.16.840.1.113883.2.1.3.2.4.17.30" code="PTT"/>
          <value xsi:type="CV" codeSystem="2.16.840.1.113883.2.1.3.2.4.16.36" code="0003"/>
        </pertinentPrescriptionTreatmentType>
      </pertinentInformation5>
      <pertinentInformation2 typeCode="PERT" contextConductionInd="true" inversionInd="false" negationInd="false">
        <seperatableInd value="false"/>
        <priorityNumber value="1"/>
        <pertinentLineItem classCode="SBADM" moodCode="RQO">
          <id root="A54219B8-F741-4C47-B662-E4F8DFA49AB6"/>
          <repeatNumber>
            <low value="1"/>
            <high value="6"/>
          </repeatNumber>
          <product typeCode="PRD" contextControlCode="OP">
            <manufacturedProduct classCode="MANU">
              <manufacturedRequestedMaterial classCode="MMAT" determinerCode="KIND">
                <code codeSystem="2.16.840.1.113883.2.1.3.2.4.15" code="39732311000001104" displayName="Amoxicillin 250mg capsules"/>
              </manufacturedRequestedMaterial>
            </manufacturedProduct>
          </product>
          <pertinentInformation2 typeCode="PERT" contextConductionInd="true">
            <seperatableInd value="false"/>
            <pertinentDosageInstructions classCode="OBS" moodCode="EVN">
              <code codeSystem="2.16.840.1.113883.2.1.3.2.4.17.30" code="DI"/>
              <value>Take two capsules three times a day</value>
            </pertinentDosageInstructions>
          </pertinentInformation2>
        </pertinentLineItem>
      </pertinentInformation2>
      <pertinentInformation2 typeCode="PERT" contextConductionInd="true" inversionInd="false" negationInd="false">
        <seperatableInd value="false"/>
        <priorityNumber value="2"/>
        <pertinentLineItem classCode="SBADM" moodCode="RQO">
          <id root="B5B2D5F8-2C43-4E10-8C2B-6A0E1E4F3C21"/>
          <product typeCode="PRD" contextControlCode="OP">
            <manufacturedProduct classCode="MANU">
              <manufacturedRequestedMaterial classCode="MMAT" determinerCode="KIND">
                <code codeSystem="2.16.840.1.113883.2.1.3.2.4.15" code="322237000" displayName="Paracetamol 500mg tablets"/>
              </manufacturedRequestedMaterial>
            </manufacturedProduct>
          </product>
          <pertinentInformation2 typeCode="PERT" contextConductionInd="true">
            <seperatableInd value="false"/>
            <pertinentDosageInstructions classCode="OBS" moodCode="EVN">
              <code codeSystem="2.16.840.1.113883.2.1.3.2.4.17.30" code="DI"/>
              <value>Take one tablet daily</value>
            </pertinentDosageInstructions>
          </pertinentInformation2>
        </pertinentLineItem>
      </pertinentInformation2>
      <pertinentInformation4 typeCode="PERT" contextConductionInd="true">
        <seperatableInd value="false"/>
        <pertinentPrescriptionType classCode="OBS" moodCode="EVN">
          <code codeSystem="2.16.840.1.113883.2.1.3.2.4.17.30" code="PT"/>
          <value codeSystem="2.16.840.1.113883.2.1.3.2.4.17.25" code="0101"/>
        </pertinentPrescriptionType>
      </pertinentInformation4>
      <pertinentInformation7 typeCode="PERT" contextConductionInd="true">
        <seperatableInd value="false"/>
        <pertinentReviewDate classCode="OBS" moodCode="EVN">
          <code codeSystem="2.16.840.1.113883.2.1.3.2.4.17.30" code="RD"/>
          <value>Routine dispensing note</value>
        </pertinentReviewDate>
      </pertinentInformation7>
    </pertinentPrescription>
  </pertinentInformation1>
</ParentPrescription>
"#
    )
}

// ============================================================================
// PKI
// ============================================================================

pub(crate) struct TestPki {
    pub root: CertificateAuthority,
    pub intermediate: CertificateAuthority,
    pub stranger: CertificateAuthority,
    /// Issued by the intermediate; valid at [`signing_time`].
    pub prescriber: IssuedCertificate,
    /// Issued by the intermediate; expired before [`signing_time`].
    pub expired_prescriber: IssuedCertificate,
    /// Issued by the stranger; no CRL distribution point.
    pub untrusted_prescriber: IssuedCertificate,
}

fn to_offset(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap()
}

fn validity(from: (i32, u32, u32), to: (i32, u32, u32)) -> Validity {
    let day = |(y, m, d): (i32, u32, u32)| to_offset(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap());
    Validity::new(day(from), day(to)).unwrap()
}

fn prescriber_request(
    name: &str,
    serial: u64,
    validity: Validity,
    crl_distribution_point: Option<&str>,
) -> PrescriberRequest {
    PrescriberRequest {
        name: name.to_owned(),
        registration_authority: "GMC".into(),
        registration_number: "4428981".into(),
        serial,
        validity,
        crl_distribution_point: crl_distribution_point.map(str::to_owned),
    }
}

pub(crate) fn pki() -> &'static TestPki {
    static PKI: OnceLock<TestPki> = OnceLock::new();
    PKI.get_or_init(|| {
        let root =
            CertificateAuthority::create("EPS Test Root CA", validity((2020, 1, 1), (2040, 1, 1)))
                .unwrap();
        let intermediate = root
            .create_intermediate(
                "EPS Test Issuing CA",
                validity((2020, 1, 1), (2040, 1, 1)),
                2,
                Some(ROOT_CRL_URI),
            )
            .unwrap();
        let stranger = CertificateAuthority::create(
            "Unrelated Root CA",
            validity((2020, 1, 1), (2040, 1, 1)),
        )
        .unwrap();

        let prescriber = intermediate
            .issue_prescriber(&prescriber_request(
                "Dr Thomas Edwards",
                1001,
                validity((2024, 1, 1), (2039, 1, 1)),
                Some(INTERMEDIATE_CRL_URI),
            ))
            .unwrap();
        let expired_prescriber = intermediate
            .issue_prescriber(&prescriber_request(
                "Dr Thomas Edwards",
                1002,
                validity((2023, 1, 1), (2023, 12, 31)),
                Some(INTERMEDIATE_CRL_URI),
            ))
            .unwrap();
        let untrusted_prescriber = stranger
            .issue_prescriber(&prescriber_request(
                "Dr Thomas Edwards",
                2001,
                validity((2024, 1, 1), (2039, 1, 1)),
                None,
            ))
            .unwrap();

        TestPki {
            root,
            intermediate,
            stranger,
            prescriber,
            expired_prescriber,
            untrusted_prescriber,
        }
    })
}

pub(crate) fn revoked(serial: u64, at: DateTime<Utc>, reason: RevocationReason) -> RevokedSerial {
    RevokedSerial {
        serial,
        revoked_at: to_offset(at),
        reason: Some(reason),
    }
}

/// A DER CRL issued by `authority`.
pub(crate) fn crl(authority: &CertificateAuthority, revoked: Vec<RevokedSerial>) -> Vec<u8> {
    authority
        .issue_revocation_list(&RevocationListRequest {
            crl_number: 1,
            this_update: to_offset(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            next_update: to_offset(Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap()),
            revoked,
        })
        .unwrap()
}

/// Serves empty, correctly signed CRLs for the root and the intermediate.
pub(crate) fn good_fetcher() -> StaticCrlFetcher {
    let pki = pki();
    StaticCrlFetcher::new()
        .with_list(ROOT_CRL_URI, crl(&pki.root, vec![]))
        .with_list(INTERMEDIATE_CRL_URI, crl(&pki.intermediate, vec![]))
}

/// Trusts the root and the intermediate.
pub(crate) fn trust_config() -> TrustConfig {
    let pki = pki();
    TrustConfig::new(vec![
        CertificateRecord::from_der(&pki.root.cert_der()).unwrap(),
        CertificateRecord::from_der(&pki.intermediate.cert_der()).unwrap(),
    ])
    .unwrap()
}

pub(crate) fn signer_for(certificate: &IssuedCertificate) -> LocalRsaSigner {
    LocalRsaSigner::from_pem(&certificate.key_pem, &certificate.cert_pem).unwrap()
}

/// The fixture prescription signed with `certificate`'s key.
pub(crate) fn signed_document(
    certificate: &IssuedCertificate,
    algorithm: SigningAlgorithm,
) -> PrescriptionDocument {
    let mut document = PrescriptionDocument::parse(&prescription_xml()).unwrap();
    sign_document(&mut document, algorithm, &signer_for(certificate)).unwrap();
    document
}
