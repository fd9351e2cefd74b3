//! Container-level round trips against synthetic settings images.

use cmkit_nonvol::{permdyn_checksum, BoltEnv, Format, GatewaySettings, PermDyn, Settings};

const GWS_MAGIC: &[u8] =
    b"6u9E9eWF0bt9Y8Rw690Le4669JYe4d-056T9p4ijm4EA6u9ee659jn9E-54e4j6rPj069K-670";

fn cmap_group() -> Vec<u8> {
    let mut group = Vec::new();
    group.extend_from_slice(&12u16.to_be_bytes());
    group.extend_from_slice(b"CMAp");
    group.extend_from_slice(&0x0001u16.to_be_bytes());
    group.extend_from_slice(&[1, 0, 1, 2]);
    group
}

fn gws_plaintext() -> Vec<u8> {
    let group = cmap_group();
    let mut plain = GWS_MAGIC.to_vec();
    plain.extend_from_slice(&0x0001u16.to_be_bytes());
    plain.extend_from_slice(&((GWS_MAGIC.len() + 6 + group.len()) as u32).to_be_bytes());
    plain.extend_from_slice(&group);
    plain
}

fn md5_with_key(buf: &[u8], hex_key: &str) -> Vec<u8> {
    let mut input = buf.to_vec();
    input.extend_from_slice(&hex::decode(hex_key).unwrap());
    cmkit_crypto::hash_md5(&input).to_vec()
}

#[test]
fn gws_plaintext_round_trip() {
    // an unencrypted file for the twg850 profile (no encryption configured)
    let plain = gws_plaintext();
    let mut file = md5_with_key(&plain, "544d4d5f5457473835302d3400000000");
    file.extend_from_slice(&plain);

    let gws = GatewaySettings::read(&file, None, Vec::new(), String::new()).unwrap();

    assert!(gws.is_valid());
    assert!(gws.checksum_valid());
    assert_eq!(gws.profile().unwrap().name(), "twg850");
    assert_eq!(gws.get("bfc.serial_console_mode").unwrap().to_str(), "rw");

    assert_eq!(gws.write().unwrap(), file);
}

#[test]
fn gws_decrypts_with_default_key_and_detects_profile() {
    // encrypt for tc7200: AES-256-ECB with the profile's first default key
    let key = hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
        .unwrap();
    let plain = gws_plaintext();
    let encrypted = cmkit_crypto::crypt_aes_256_ecb(&plain, &key, true).unwrap();

    let mut file = md5_with_key(&encrypted, "544d4d5f544337323030000000000000");
    file.extend_from_slice(&encrypted);

    let gws = GatewaySettings::read(&file, None, Vec::new(), String::new()).unwrap();

    assert!(gws.is_valid());
    assert!(gws.checksum_valid());
    assert_eq!(gws.profile().unwrap().name(), "tc7200");
    assert_eq!(gws.key(), &key[..]);

    assert_eq!(gws.write().unwrap(), file);
}

#[test]
fn gws_set_updates_declared_size() {
    let plain = gws_plaintext();
    let mut file = md5_with_key(&plain, "544d4d5f5457473835302d3400000000");
    file.extend_from_slice(&plain);

    let mut gws = GatewaySettings::read(&file, None, Vec::new(), String::new()).unwrap();
    gws.set("bfc.serial_console_mode", "factory").unwrap();

    let out = gws.write().unwrap();
    let re = GatewaySettings::read(&out, None, Vec::new(), String::new()).unwrap();

    assert!(re.checksum_valid());
    assert_eq!(re.get("bfc.serial_console_mode").unwrap().to_str(), "factory");
}

#[test]
fn gws_aes_cbc_with_length_prefix_round_trip() {
    // evw32c: AES-128-CBC, PKCS#7 padding, checksum inside the encrypted
    // region, and a u32 length prefix
    let key = hex::decode("6c3ea0477630ce21a2ce334aa746c2cdc782dc4c098c66cbd9cd27d825682c81")
        .unwrap();
    let plain = gws_plaintext();

    let mut full = md5_with_key(&plain, "3250736c633b752865676d64302d2778");
    full.extend_from_slice(&plain);

    // PKCS#7 pad to the AES block size
    let pad = 16 - full.len() % 16;
    full.extend(std::iter::repeat(pad as u8).take(pad));

    let encrypted = cmkit_crypto::crypt_aes_128_cbc(&full, &key, true).unwrap();

    let mut file = (encrypted.len() as u32).to_be_bytes().to_vec();
    file.extend_from_slice(&encrypted);

    let gws = GatewaySettings::read(&file, None, Vec::new(), String::new()).unwrap();

    assert!(gws.is_valid());
    assert!(gws.checksum_valid());
    assert_eq!(gws.profile().unwrap().name(), "evw32c");

    assert_eq!(gws.write().unwrap(), file);
}

#[test]
fn gws_motorola_tail_key_round_trip() {
    // sbg6580: the PRNG seed byte rides at the end of the file
    let plain = gws_plaintext();

    let mut full = md5_with_key(&plain, "3250736c633b752865676d64302d2778");
    full.extend_from_slice(&plain);

    let mut file = cmkit_crypto::crypt_motorola(&full, &[0x5a]).unwrap();
    file.push(0x5a);

    let gws = GatewaySettings::read(&file, None, Vec::new(), String::new()).unwrap();

    assert!(gws.is_valid());
    assert!(gws.checksum_valid());
    assert_eq!(gws.profile().unwrap().name(), "sbg6580");
    assert_eq!(gws.key(), &[0x5a]);

    assert_eq!(gws.write().unwrap(), file);
}

fn legacy_permdyn(valid_segment_1: bool) -> Vec<u8> {
    const LEN: usize = 0x1000;
    const SEGMENT_SIZE: u32 = 0x400;

    let group = cmap_group();
    let mut file = vec![0xffu8; LEN];

    let mut segment = Vec::new();
    segment.extend_from_slice(&((8 + group.len()) as u32).to_be_bytes());
    segment.extend_from_slice(&permdyn_checksum(&group).to_be_bytes());
    segment.extend_from_slice(&group);

    // segment 0 is always present (the fallback)
    file[202..202 + segment.len()].copy_from_slice(&segment);

    if valid_segment_1 {
        let at = 202 + SEGMENT_SIZE as usize;
        file[at..at + segment.len()].copy_from_slice(&segment);
    }

    // footer: segment size, and a bitmask encoding one write
    let footer_at = LEN - 8;
    file[footer_at..footer_at + 4].copy_from_slice(&SEGMENT_SIZE.to_be_bytes());
    file[footer_at + 4..].copy_from_slice(&0xfffffffcu32.to_be_bytes());

    file
}

#[test]
fn permdyn_legacy_selects_segment_by_write_count() {
    let file = legacy_permdyn(true);
    let permdyn = PermDyn::read(&file, Format::Dyn, Vec::new()).unwrap();

    assert!(permdyn.is_valid());
    assert!(permdyn.checksum_valid());
    // bitmask 0xfffffffc -> write count 1 -> primary at offset 0x400
    assert_eq!(permdyn.write_count(), 1);
    assert_eq!(permdyn.groups().len(), 1);
    assert_eq!(permdyn.get("bfc.stop_at_console").unwrap().to_str(), "1");
}

#[test]
fn permdyn_legacy_falls_back_to_offset_zero() {
    // segment 1 is blank, so its header reads as 0xffffffff
    let file = legacy_permdyn(false);
    let permdyn = PermDyn::read(&file, Format::Dyn, Vec::new()).unwrap();

    assert!(permdyn.checksum_valid());
    assert_eq!(permdyn.get("bfc.stop_at_console").unwrap().to_str(), "1");
}

#[test]
fn permdyn_modern_round_trip() {
    let group = cmap_group();
    let mut file = Vec::new();
    file.extend_from_slice(&((8 + group.len()) as u32).to_be_bytes());
    file.extend_from_slice(&permdyn_checksum(&group).to_be_bytes());
    file.extend_from_slice(&group);

    let permdyn = PermDyn::read(&file, Format::Perm, Vec::new()).unwrap();
    assert!(permdyn.checksum_valid());

    assert_eq!(permdyn.write().unwrap(), file);
}

#[test]
fn permdyn_checksum_tail_rules() {
    // 4-byte words
    assert_eq!(permdyn_checksum(&[0, 0, 0, 1]), !(4u32 + 8 + 1));
    // 2-byte tail is shifted into the high half
    assert_eq!(permdyn_checksum(&[0x12, 0x34]), !(2u32 + 8 + 0x0012_3400));
    // 1-byte tail lands one byte lower
    assert_eq!(permdyn_checksum(&[0x56]), !(1u32 + 8 + 0x5600));
}

fn bolt_file() -> Vec<u8> {
    let mut data = Vec::new();

    // (0x01, "BOOT_FLAGS=0")
    data.push(0x01);
    data.push(1 + 12);
    data.push(0x00);
    data.extend_from_slice(b"BOOT_FLAGS=0");

    // (0x02, a long DATA record)
    let long = vec![b'x'; 600];
    data.push(0x02);
    data.extend_from_slice(&((1 + 5 + long.len()) as u16).to_be_bytes());
    data.push(0x02); // ro
    data.extend_from_slice(b"DATA=");
    data.extend_from_slice(&long);

    data.push(0x00); // end marker

    let mut file = Vec::new();
    file.extend_from_slice(&0x011a0000u32.to_be_bytes());
    file.extend_from_slice(&0xbabefeedu32.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&7u32.to_le_bytes()); // write count
    file.extend_from_slice(&(data.len() as u32).to_le_bytes());
    file.extend_from_slice(&cmkit_crypto::crc32(&data).to_le_bytes());
    file.extend_from_slice(&data);
    file.resize(0x800, 0xff);

    file
}

#[test]
fn boltenv_round_trip() {
    let file = bolt_file();
    let env = BoltEnv::read(&file, Vec::new()).unwrap();

    assert!(env.checksum_valid());
    assert!(env.size_valid());
    assert_eq!(env.vars().len(), 2);
    assert_eq!(env.get("BOOT_FLAGS").unwrap().to_pretty(), "0");

    let out = env.write().unwrap();
    assert_eq!(out.len(), file.len());

    // the write count is bumped on every write; everything else survives
    let re = BoltEnv::read(&out, Vec::new()).unwrap();
    assert!(re.checksum_valid());
    assert_eq!(re.get("DATA").unwrap().to_pretty().len(), 600);
    assert_eq!(&out[..16], &file[..16]);
}

#[test]
fn boltenv_set_and_write() {
    let file = bolt_file();
    let mut env = BoltEnv::read(&file, Vec::new()).unwrap();

    env.set("BOOT_FLAGS", "quiet").unwrap();
    let out = env.write().unwrap();

    let re = BoltEnv::read(&out, Vec::new()).unwrap();
    assert_eq!(re.get("BOOT_FLAGS").unwrap().to_pretty(), "quiet");
}

#[test]
fn boltenv_encrypted_round_trip() {
    let key = vec![0x42u8; 32];
    let plain = bolt_file();
    let file = cmkit_crypto::crypt_aes_256_ecb(&plain, &key, true).unwrap();

    let env = BoltEnv::read(&file, key.clone()).unwrap();
    assert!(env.checksum_valid());

    let out = env.write().unwrap();
    let re = BoltEnv::read(&out, key).unwrap();
    assert!(re.checksum_valid());
}

#[test]
fn settings_sniffs_format() {
    let gws = {
        let plain = gws_plaintext();
        let mut file = md5_with_key(&plain, "544d4d5f5457473835302d3400000000");
        file.extend_from_slice(&plain);
        file
    };

    match Settings::read(&gws, Format::Unknown, None, Vec::new(), String::new()).unwrap() {
        Settings::Gws(s) => assert!(s.is_valid()),
        _ => panic!("expected gwsettings"),
    }

    let permdyn = legacy_permdyn(true);
    match Settings::read(&permdyn, Format::Unknown, None, Vec::new(), String::new()).unwrap() {
        Settings::PermDyn(s) => assert!(s.checksum_valid()),
        _ => panic!("expected permdyn"),
    }
}
