use rand::rngs::OsRng;
use rand::Rng;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
// ---
use lamport_script::hash::envelope;
use lamport_script::{
    LamportScheme, MasterSecret, SchemeParams, ScriptCompiler, ScriptError, Signature,
    SignatureSchemeTrait, StackMachine,
};

/// A seedable CSPRNG used for number generation
type CsPrng = ChaCha20Rng;

#[test]
fn test_canonical_sign_compile_execute() {
    let mut seed_rng = OsRng;
    let random_seed = seed_rng.gen::<u64>();
    println!("seed: {random_seed}");
    let mut rng = CsPrng::seed_from_u64(random_seed);

    let mut secret = [0u8; 32];
    rng.fill(&mut secret);
    let secret = MasterSecret::new(secret);

    let params = SchemeParams::CANONICAL;
    let scheme: LamportScheme = LamportScheme::new(params).unwrap();
    let key_pair = scheme.gen_key_pair(&secret).unwrap();

    let mut message = vec![0u8; 64];
    rng.fill(&mut message[..]);
    let digest = envelope(&message);

    let signature = scheme.sign(&digest, &key_pair.secret).unwrap();
    let bytes = signature.to_bytes();
    assert_eq!(bytes.len(), 3540);
    assert!(scheme.verify(&digest, &signature, &key_pair.public));

    let program = ScriptCompiler::new(params).unwrap().compile();
    assert_eq!(program.instruction_count(), 3298);

    // The verifier only sees the wire bytes.
    let parsed = Signature::from_bytes(&bytes, &params).unwrap();
    let out = StackMachine::new()
        .execute(&program, &key_pair.public, parsed.witness())
        .unwrap();
    assert_eq!(out, digest);

    // A preimage byte of the last digit.
    let mut tampered = bytes.clone();
    tampered[bytes.len() - 2] ^= 0x80;
    let parsed = Signature::from_bytes(&tampered, &params).unwrap();
    assert_eq!(
        StackMachine::new().execute(&program, &key_pair.public, parsed.witness()),
        Err(ScriptError::EqualVerifyFailed)
    );
}

#[test]
fn test_all_zero_secret_reduced_scenario() {
    let params = SchemeParams::new(2, 4).unwrap();
    let scheme: LamportScheme = LamportScheme::new(params).unwrap();
    let key_pair = scheme
        .gen_key_pair(&"00".repeat(32).parse::<MasterSecret>().unwrap())
        .unwrap();

    let digest = [0x01, 0x03];
    let signature = scheme.sign(&digest, &key_pair.secret).unwrap();
    assert_eq!(signature.to_bytes().len(), 114);

    let program = ScriptCompiler::new(params).unwrap().compile();
    let listing = program.bind(&key_pair.public).to_string();
    assert!(listing.contains(&hex::encode(key_pair.public)));

    let out = StackMachine::new()
        .execute(&program, &key_pair.public, signature.witness())
        .unwrap();
    assert_eq!(out, digest);
}

#[test]
fn test_signature_of_one_key_fails_for_another() {
    let params = SchemeParams::new(3, 16).unwrap();
    let scheme: LamportScheme = LamportScheme::new(params).unwrap();
    let alice = scheme.gen_key_pair(&MasterSecret::new([1u8; 32])).unwrap();
    let eve = scheme.gen_key_pair(&MasterSecret::new([2u8; 32])).unwrap();

    let digest = [0x0f, 0x00, 0x07];
    let eve_signature = scheme.sign(&digest, &eve.secret).unwrap();
    assert!(!scheme.verify(&digest, &eve_signature, &alice.public));

    let program = ScriptCompiler::new(params).unwrap().compile();
    assert_eq!(
        StackMachine::new().execute(&program, &alice.public, eve_signature.witness()),
        Err(ScriptError::EqualVerifyFailed)
    );
}
