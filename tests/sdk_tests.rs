//! Validator loading, addresses, the escrow protocol and the authorization oracle.

use std::sync::Arc;

use plutus_escrow_lab::sdk::escrow::DEFAULT_MIN_OUTPUT;
use plutus_escrow_lab::sdk::types::{NetworkId, PaymentPart};
use plutus_escrow_lab::sdk::*;

const BLUEPRINT: &[u8] = include_bytes!("../fixtures/hello_world.plutus.json");
const BLUEPRINT_HASH: &str = "3c6944cf944cb9efeb033118e081efe76eaeb30649a52140396b7c4f";

fn validator() -> Arc<ValidatorDescriptor> {
    Arc::new(ValidatorDescriptor::load(BLUEPRINT).unwrap())
}

fn protocol() -> EscrowProtocol {
    EscrowBuilder::new(validator()).build(&Blake2bHasher).unwrap()
}

fn blueprint(version: &str, code: &str) -> Vec<u8> {
    serde_json::json!({
        "preamble": { "title": "t", "plutusVersion": version },
        "validators": [{ "title": "v.v", "compiledCode": code }]
    })
    .to_string()
    .into_bytes()
}

fn escrow_utxo(protocol: &EscrowProtocol, owner: Credential) -> Utxo {
    Utxo {
        out_ref: OutputRef::new(TransactionId::from_bytes([0xaa; 32]), 0),
        output: TxOutput {
            address: *protocol.address(),
            value: 5_000_000,
            datum: Some(owner_datum(&owner)),
        },
    }
}

// ---------------------------------------------------------------------------
// Validator descriptor
// ---------------------------------------------------------------------------

mod validator_loading {
    use super::*;

    #[test]
    fn loads_fixture() {
        let v = validator();
        assert_eq!(v.kind, ScriptVersion::PlutusV2);
        assert_eq!(v.title, "hello_world.hello_world");
        assert_eq!(v.code[0], 0x59);
        assert_eq!(v.script_hash(&Blake2bHasher).to_hex(), BLUEPRINT_HASH);
        assert!(v.verify_hash(&Blake2bHasher).is_ok());
    }

    #[test]
    fn load_titled_selects_by_title() {
        let v = ValidatorDescriptor::load_titled(BLUEPRINT, "hello_world.hello_world").unwrap();
        assert_eq!(v, *validator());
        assert!(matches!(
            ValidatorDescriptor::load_titled(BLUEPRINT, "missing"),
            Err(EscrowError::Artifact(_))
        ));
    }

    #[test]
    fn malformed_artifacts_fail() {
        let cases: Vec<Vec<u8>> = vec![
            b"not json".to_vec(),
            br#"{"preamble":{"plutusVersion":"v2"},"validators":[]}"#.to_vec(),
            br#"{"preamble":{"plutusVersion":"v2"},"validators":[{"title":"x"}]}"#.to_vec(),
            blueprint("v2", ""),
            blueprint("v2", "zz"),
            blueprint("v2", "4101ff"),
            blueprint("v2", "01"),
            blueprint("v2", "40"),
            blueprint("v9", "4101"),
        ];
        for case in cases {
            let result = ValidatorDescriptor::load(&case);
            assert!(
                matches!(result, Err(EscrowError::Artifact(_))),
                "accepted {}",
                String::from_utf8_lossy(&case)
            );
        }
    }

    #[test]
    fn declared_hash_mismatch_fails_build() {
        let doc = serde_json::json!({
            "preamble": { "plutusVersion": "v2" },
            "validators": [{
                "title": "v",
                "compiledCode": "4101",
                "hash": "00".repeat(28),
            }]
        })
        .to_string();
        let v = Arc::new(ValidatorDescriptor::load(doc.as_bytes()).unwrap());
        assert!(matches!(
            EscrowBuilder::new(v).build(&Blake2bHasher),
            Err(EscrowError::Artifact(_))
        ));
    }

    #[test]
    fn script_hash_depends_on_language() {
        let v1 = ValidatorDescriptor::from_code(ScriptVersion::PlutusV1, vec![0x41, 0x01]).unwrap();
        let v2 = ValidatorDescriptor::from_code(ScriptVersion::PlutusV2, vec![0x41, 0x01]).unwrap();
        assert_ne!(v1.script_hash(&Blake2bHasher), v2.script_hash(&Blake2bHasher));
    }

    #[test]
    fn double_cbor_wraps_code_once_more() {
        let v = ValidatorDescriptor::from_code(ScriptVersion::PlutusV2, vec![0x42, 0xbe, 0xef])
            .unwrap();
        assert_eq!(v.double_cbor_hex().unwrap(), "4342beef");
    }
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

mod addresses {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let v = validator();
        let a = v.derive_address(Network::Preview, &Blake2bHasher);
        let b = v.derive_address(Network::Preview, &Blake2bHasher);
        assert_eq!(a, b);
        assert_eq!(a.script_hash(), Some(v.script_hash(&Blake2bHasher)));
        assert_eq!(a.to_bytes()[0], 0x70);
    }

    #[test]
    fn network_selects_prefix_and_header() {
        let v = validator();
        let test = v.derive_address(Network::Preprod, &Blake2bHasher);
        let main = v.derive_address(Network::Mainnet, &Blake2bHasher);
        assert!(test.to_string().starts_with("addr_test1"));
        assert!(main.to_string().starts_with("addr1"));
        assert_eq!(main.to_bytes()[0], 0x71);
        assert_ne!(test, main);
    }

    #[test]
    fn bech32_round_trip() {
        let (_, credential) = generate_keypair();
        for network in [Network::Mainnet, Network::Preprod, Network::Preview] {
            let key = Address::from_credential(network, credential);
            assert_eq!(key.to_bytes()[0] & 0xf0, 0x60);
            assert_eq!(key.to_string().parse::<Address>().unwrap(), key);

            let script = validator().derive_address(network, &Blake2bHasher);
            assert_eq!(script.to_string().parse::<Address>().unwrap(), script);
        }
    }

    #[test]
    fn preprod_and_preview_share_an_address_space() {
        let (_, credential) = generate_keypair();
        let a = Address::from_credential(Network::Preprod, credential);
        let b = Address::from_credential(Network::Preview, credential);
        assert_eq!(a, b);
        assert_eq!(a.network, NetworkId::Testnet);
    }

    #[test]
    fn rejects_mismatched_prefix() {
        let (_, credential) = generate_keypair();
        let addr = Address::from_credential(Network::Mainnet, credential);
        let data = bech32::ToBase32::to_base32(&addr.to_bytes());
        let forged = bech32::encode("addr_test", data, bech32::Variant::Bech32).unwrap();
        let err = forged.parse::<Address>().unwrap_err();
        assert_eq!(err.what, "address");
        assert!(err.reason.contains("prefix"), "{err}");
    }

    #[test]
    fn parse_failures_are_their_own_kind() {
        let err = "abcd".parse::<TransactionId>().unwrap_err();
        assert_eq!(err, ParseError::new("TransactionId", "expected 32 bytes, got 2"));
        assert_eq!("zz".parse::<Credential>().unwrap_err().what, "Credential");
        assert_eq!("addr1xyz".parse::<Address>().unwrap_err().what, "address");

        let from_json =
            serde_json::from_str::<OutputRef>(r#"{"transaction_id": "00", "index": 0}"#)
                .unwrap_err();
        assert!(from_json.to_string().contains("invalid TransactionId"), "{from_json}");

        assert!(matches!(EscrowError::from(err), EscrowError::Parse(_)));
    }

    #[test]
    fn credential_comes_from_public_key() {
        let (kp, credential) = generate_keypair();
        assert_eq!(credential_of(&kp.x_only_public_key().0), credential);
        let addr = Address::from_credential(Network::Preview, credential);
        assert_eq!(addr.payment, PaymentPart::Key(credential));
        assert_eq!(addr.credential(), Some(credential));
        assert_eq!(addr.script_hash(), None);
    }

    #[test]
    fn serde_uses_text_forms() {
        let (_, credential) = generate_keypair();
        let addr = Address::from_credential(Network::Preview, credential);
        let json = serde_json::to_value(addr).unwrap();
        assert_eq!(json, serde_json::Value::String(addr.to_string()));
        let back: Address = serde_json::from_value(json).unwrap();
        assert_eq!(back, addr);

        let cred_json = serde_json::to_value(credential).unwrap();
        assert_eq!(cred_json, serde_json::Value::String(credential.to_hex()));
    }
}

// ---------------------------------------------------------------------------
// Escrow protocol
// ---------------------------------------------------------------------------

mod protocol_intents {
    use super::*;

    #[test]
    fn builder_defaults() {
        let p = protocol();
        assert_eq!(p.network(), Network::Preview);
        assert_eq!(p.min_output(), DEFAULT_MIN_OUTPUT);
        assert_eq!(p.script_hash().to_hex(), BLUEPRINT_HASH);
        assert_eq!(
            *p.address(),
            validator().derive_address(Network::Preview, &Blake2bHasher)
        );
    }

    #[test]
    fn builder_rejects_zero_minimum() {
        assert!(matches!(
            EscrowBuilder::new(validator()).min_output(0).build(&Blake2bHasher),
            Err(EscrowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn lock_produces_owner_datum() {
        let p = protocol();
        let (_, owner) = generate_keypair();
        let intent = p.lock(1_000_000, owner).unwrap();
        assert_eq!(intent.address, *p.address());
        assert_eq!(intent.value, 1_000_000);
        assert_eq!(intent.datum, owner_datum(&owner));
        assert_eq!(intent.datum_cbor, owner_datum(&owner).encode().unwrap());
        assert_eq!(owner_of(&intent.datum), Some(owner));
    }

    #[test]
    fn lock_below_minimum_fails() {
        let p = protocol();
        let (_, owner) = generate_keypair();
        for amount in [0, 1, DEFAULT_MIN_OUTPUT - 1] {
            assert!(matches!(
                p.lock(amount, owner),
                Err(EscrowError::InsufficientValue { minimum: DEFAULT_MIN_OUTPUT, .. })
            ));
        }
    }

    #[test]
    fn zero_is_rejected_even_with_tiny_minimum() {
        let p = EscrowBuilder::new(validator())
            .min_output(1)
            .build(&Blake2bHasher)
            .unwrap();
        let (_, owner) = generate_keypair();
        assert!(matches!(
            p.lock(0, owner),
            Err(EscrowError::InsufficientValue { amount: 0, .. })
        ));
        assert!(p.lock(1, owner).is_ok());
    }

    #[test]
    fn unlock_does_not_check_authorization() {
        let p = protocol();
        let (_, owner) = generate_keypair();
        let (_, stranger) = generate_keypair();
        let utxo = escrow_utxo(&p, owner);
        let redeemer = PlutusData::constr(0, vec![PlutusData::bytes_from_utf8("Hello, World!")]);

        let intent = p.unlock(&utxo, redeemer.clone(), stranger).unwrap();
        assert_eq!(intent.required_signer, stranger);
        assert_eq!(intent.input, utxo);
        assert_eq!(intent.redeemer, redeemer);
        assert_eq!(intent.redeemer_cbor, redeemer.encode().unwrap());
        assert_eq!(*intent.script, *validator());
    }

    #[test]
    fn unlock_of_foreign_output_is_stale() {
        let p = protocol();
        let (_, owner) = generate_keypair();

        let mut elsewhere = escrow_utxo(&p, owner);
        elsewhere.output.address = Address::from_credential(Network::Preview, owner);
        assert!(matches!(
            p.unlock(&elsewhere, PlutusData::constr(0, vec![]), owner),
            Err(EscrowError::StaleReference(_))
        ));

        let mut no_datum = escrow_utxo(&p, owner);
        no_datum.output.datum = None;
        assert!(matches!(
            p.unlock(&no_datum, PlutusData::constr(0, vec![]), owner),
            Err(EscrowError::StaleReference(_))
        ));
    }

    #[test]
    fn unencodable_redeemer_is_an_encoding_error() {
        let p = protocol();
        let (_, owner) = generate_keypair();
        let mut redeemer = PlutusData::constr(0, vec![]);
        for _ in 0..400 {
            redeemer = PlutusData::List(vec![redeemer]);
        }
        assert!(matches!(
            p.unlock(&escrow_utxo(&p, owner), redeemer, owner),
            Err(EscrowError::Encoding(CodecError::DepthExceeded(_)))
        ));
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

mod state_machine {
    use super::*;

    fn refs() -> (OutputRef, Credential, TransactionId) {
        (
            OutputRef::new(TransactionId::from_bytes([1; 32]), 0),
            Credential::from_bytes([2; 28]),
            TransactionId::from_bytes([3; 32]),
        )
    }

    #[test]
    fn happy_path() {
        let (out_ref, owner, by) = refs();
        let locked = EscrowState::Unlocked.lock_confirmed(out_ref, owner).unwrap();
        assert_eq!(locked, EscrowState::Locked { out_ref, owner });
        let consumed = locked.unlock_confirmed(by).unwrap();
        assert_eq!(consumed, EscrowState::Consumed { out_ref, by });
        assert_eq!(consumed.out_ref(), Some(out_ref));
    }

    #[test]
    fn consumed_is_terminal() {
        let (out_ref, owner, by) = refs();
        let consumed = EscrowState::Consumed { out_ref, by };
        assert!(matches!(
            consumed.unlock_confirmed(by),
            Err(EscrowError::StaleReference(r)) if r == out_ref
        ));
        assert!(matches!(
            consumed.lock_confirmed(out_ref, owner),
            Err(EscrowError::InvalidTransition { from: "consumed", .. })
        ));
    }

    #[test]
    fn cannot_unlock_before_locking() {
        let (_, _, by) = refs();
        assert!(matches!(
            EscrowState::Unlocked.unlock_confirmed(by),
            Err(EscrowError::InvalidTransition { from: "unlocked", .. })
        ));
        assert_eq!(EscrowState::Unlocked.out_ref(), None);
    }

    #[test]
    fn cannot_lock_twice() {
        let (out_ref, owner, _) = refs();
        let locked = EscrowState::Locked { out_ref, owner };
        assert!(matches!(
            locked.lock_confirmed(out_ref, owner),
            Err(EscrowError::InvalidTransition { from: "locked", .. })
        ));
    }

    #[test]
    fn serializes_with_state_tag() {
        let (out_ref, owner, _) = refs();
        let json = serde_json::to_value(EscrowState::Locked { out_ref, owner }).unwrap();
        assert_eq!(json["state"], "locked");
        assert_eq!(json["owner"], owner.to_hex());
    }
}

// ---------------------------------------------------------------------------
// Authorization oracle
// ---------------------------------------------------------------------------

mod oracle {
    use super::*;

    fn ctx(signatories: Vec<Credential>) -> ScriptContext {
        ScriptContext {
            tx_id: TransactionId::from_bytes([9; 32]),
            spending: OutputRef::new(TransactionId::from_bytes([8; 32]), 0),
            signatories,
        }
    }

    #[test]
    fn owner_signature_accepts() {
        let (_, owner) = generate_keypair();
        let (_, other) = generate_keypair();
        let verdict = OwnerSignatureOracle.evaluate(
            &validator(),
            &owner_datum(&owner),
            &PlutusData::constr(0, vec![]),
            &ctx(vec![other, owner]),
        );
        assert!(verdict.is_ok());
    }

    #[test]
    fn stranger_rejected_for_any_redeemer() {
        let (_, owner) = generate_keypair();
        let (_, stranger) = generate_keypair();
        let redeemers = [
            PlutusData::constr(0, vec![]),
            PlutusData::constr(0, vec![PlutusData::bytes_from_utf8("Hello, World!")]),
            PlutusData::bytes(owner.as_bytes().to_vec()),
            owner_datum(&owner),
            PlutusData::integer(42),
        ];
        for redeemer in &redeemers {
            let verdict = OwnerSignatureOracle.evaluate(
                &validator(),
                &owner_datum(&owner),
                redeemer,
                &ctx(vec![stranger]),
            );
            assert!(verdict.is_err(), "accepted redeemer {redeemer:?}");
        }
    }

    #[test]
    fn malformed_datum_rejected() {
        let (_, owner) = generate_keypair();
        let verdict = OwnerSignatureOracle.evaluate(
            &validator(),
            &PlutusData::integer(1),
            &PlutusData::constr(0, vec![]),
            &ctx(vec![owner]),
        );
        assert!(verdict.unwrap_err().contains("names no owner"));
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

mod signatures {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let (kp, _) = generate_keypair();
        let tx_id = TransactionId::from_bytes([5; 32]);
        let sig = schnorr_sign(&tx_id, &kp);
        let vkey = kp.x_only_public_key().0.serialize();
        assert!(schnorr_verify(&tx_id, &vkey, &sig));
        assert!(!schnorr_verify(&TransactionId::from_bytes([6; 32]), &vkey, &sig));

        let (other, _) = generate_keypair();
        assert!(!schnorr_verify(&tx_id, &other.x_only_public_key().0.serialize(), &sig));
    }
}
