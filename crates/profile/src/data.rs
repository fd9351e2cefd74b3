//! The built-in device profile table.
//!
//! Addresses and partition layouts in here come from firmware analysis of
//! the respective devices; treat them as data, not code. A few profiles
//! carry only the settings file parameters and no memory map at all; those
//! are still useful to `cmcfg`.

use std::sync::Arc;

use crate::{
    AddrSpace, ArgsMode, CfgFlag, CodeCfg, Encryption, Func, InterfaceId, OptVal, Padding,
    Profile, Version,
};

const MB: u32 = 1024 * 1024;

const MD5_KEY_GENERIC: &str = "3250736c633b752865676d64302d2778";

fn keyfun_tc7200(password: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, k) in key.iter_mut().enumerate() {
        *k = i as u8;
    }

    let pw = password.as_bytes();
    let len = pw.len().min(32);
    key[..len].copy_from_slice(&pw[..len]);

    key
}

fn generic() -> Arc<Profile> {
    Profile::new("generic", "Generic Profile")
        .md5_key(MD5_KEY_GENERIC)
        .def_key("0000000000000000000000000000000000000000000000000000000000000000")
        .def_key("0001020304050607080910111213141516171819202122232425262728293031")
        .def_key("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
        .space(AddrSpace::ram(0, 0).part("bootloader", 0xbfc00000, 0))
        // lets the flash dumper run on any device, provided an explicit size
        .space(
            AddrSpace::new("flash", 0)
                .part("bootloader", 0, 0)
                .part_alt("dynnv", 0, 0, "dyn")
                .part_alt("vennv", 0, 0, "ven")
                .part_alt("permnv", 0, 0, "perm")
                .part("image1", 0, 0)
                .part("image2", 0, 0)
                .part("image3", 0, 0)
                .part("image3e", 0, 0)
                .part("linux", 0, 0)
                .part("linuxapps", 0, 0)
                .part("linuxkfs", 0, 0)
                .part("dhtml", 0, 0),
        )
        .build()
}

fn debug() -> Arc<Profile> {
    Profile::new("debug", "Debug")
        .magic(0x80010000, b"DBUG")
        .space(AddrSpace::ram(0, 0))
        .space(
            AddrSpace::new("flash", 0x100000)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("permnv", 0x10000, 0x10000, "perm")
                .part_alt("dynnv", 0xe0000, 0x20000, "dyn"),
        )
        .version(
            Version::new(InterfaceId::Bootloader)
                .codecfg(CodeCfg {
                    rwcode: 0x85eff000,
                    buffer: 0x85f00000,
                    printf: 0x83f8b0c0,
                    sscanf: 0x83f8ba94,
                    getline: 0x83f8ad10,
                    ..Default::default()
                })
                .func("flash", "read", Func::new(0x80010068, ArgsMode::BufOffLen))
                .func("flash", "write", Func::new(0x80010034, ArgsMode::PtrBufOffLen))
                .func("flash", "erase", Func::new(0x80010004, ArgsMode::OffLen)),
        )
        .build()
}

fn cg3000() -> Arc<Profile> {
    Profile::new("cg3000", "Netgear CG3000")
        .pssig(0xa0f7)
        .space(AddrSpace::ram(0, 0))
        .build()
}

fn cg3101() -> Arc<Profile> {
    Profile::new("cg3101", "Netgear CG3101")
        .pssig(0xa0e7)
        .encryption(Encryption::TdesEcb)
        .padding(Padding::AnsiIsh)
        .cfg_flags(CfgFlag::GwsFullEnc.into())
        .md5_key(MD5_KEY_GENERIC)
        .def_key("8890697cec4823e2ea3ad4c87f13978e46ac783a2d843e11")
        .space(AddrSpace::ram(0, 0))
        .build()
}

fn cbw383zn() -> Arc<Profile> {
    Profile::new("cbw383zn", "NetMASTER CBW-383ZN")
        .arch("bcm3383")
        .pssig(0x8364)
        .blsig(0x3383)
        .encryption(Encryption::DesEcb)
        .cfg_flags(CfgFlag::GwsFullEnc.into())
        .md5_key(MD5_KEY_GENERIC)
        .def_key("1122334455667788")
        .magic(0x83f8a9ac, b"2.4.0")
        .space(
            AddrSpace::ram(0x80000000, 128 * MB)
                .part("image", 0x85f00000, 0xff0000)
                .part("bootloader", 0x83f80000, 0x020000),
        )
        .space(
            AddrSpace::new("flash", 32 * MB)
                .part("bootloader", 0x0000000, 0x010000)
                .part_alt("permnv", 0x0010000, 0x010000, "perm")
                .part("image1", 0x0030000, 0xfe0000)
                .part("image2", 0x1000000, 0xff0000)
                .part_alt("dynnv", 0x1ff0000, 0x010000, "dyn"),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg { rwcode: 0x80002000, ..Default::default() })
                .opt("bfc:flash_read_direct", OptVal::Num(1)),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("0081.799.009")
                .magic(0x80dc48d0, b"009")
                .opt("bfc:conthread_instance", OptVal::Num(0x81204074))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .version(Version::new(InterfaceId::Bootloader).codecfg(CodeCfg {
            rwcode: 0x84010000,
            buffer: 0x85f00000,
            ..Default::default()
        }))
        .version(
            Version::new(InterfaceId::Bootloader).name("2.4.0").magic(0x83f8a9ac, b"2.4.0"),
        )
        .build()
}

fn ch7485e() -> Arc<Profile> {
    Profile::new("ch7485e", "Compal CH7485E")
        .pssig(0xa923)
        .kseg1(0x20000000)
        .magic(0x83f8ea40, b"2.5.0beta1")
        .space(
            AddrSpace::ram(0x80000000, 256 * MB).part("bootloader", 0x83f80000, 0x020000),
        )
        .space(
            AddrSpace::new("nvram", 512 * 1024)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("dynnv", 0x10000, 0x20000, "dyn")
                .part_alt("permnv", 0x40000, 0x40000, "perm"),
        )
        .space(
            AddrSpace::new("flash", 128 * MB)
                .part_alt("linuxapps", 0x0000000, 0x4c40000, "image3e")
                .part("image1", 0x4c40000, 0x0d80000)
                .part("image2", 0x59c0000, 0x0d80000)
                .part_alt("linux", 0x6740000, 0x0480000, "image3")
                .part("linuxkfs", 0x6bc0000, 0x1200000)
                .part("dhtml", 0x7dc0000, 0x0240000),
        )
        .version(Version::new(InterfaceId::Bootloader).codecfg(CodeCfg {
            rwcode: 0x84010000,
            buffer: 0x85f00000,
            ..Default::default()
        }))
        .version(
            Version::new(InterfaceId::Bootloader)
                .name("2.5.0beta1")
                .magic(0x83f8ea40, b"2.5.0beta1")
                .codecfg(CodeCfg { printf: 0x83f8b3ec, ..Default::default() })
                .func(
                    "flash",
                    "read",
                    Func::new(0x83f83b38, ArgsMode::BufOffLen).patch(0x83f83cdc, 0x10000018),
                )
                .func("nvram", "read", Func::new(0x83f811bc, ArgsMode::OffBufLen)),
        )
        .build()
}

fn c6300bd() -> Arc<Profile> {
    Profile::new("c6300bd", "Netgear C6300BD")
        .arch("bcm3384")
        .pssig(0xa0eb)
        .kseg1(0x20000000)
        .encryption(Encryption::DesEcb)
        .cfg_flags(CfgFlag::GwsFullEnc.into())
        .md5_key(MD5_KEY_GENERIC)
        .def_key("aabbccddeeffaabb")
        .magic(0x83f8ecc8, b"2.5.0alpha8R2")
        .space(
            AddrSpace::ram(0x80000000, 256 * MB).part("bootloader", 0x83f80000, 0x020000),
        )
        .space(
            AddrSpace::new("nvram", 512 * 1024)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("permnv", 0x10000, 0x20000, "perm")
                .part_alt("vennv", 0x30000, 0x10000, "ven")
                .part_alt("dynnv", 0x40000, 0x40000, "dyn"),
        )
        .space(
            AddrSpace::new("flash", 128 * MB)
                .part_alt("linuxapps", 0x0000000, 0x23c0000, "image3e")
                .part("image1", 0x23c0000, 0x0900000)
                .part("image2", 0x2cc0000, 0x0900000)
                .part_alt("linux", 0x35c0000, 0x2400000, "image3")
                .part("linuxkfs", 0x59c0000, 0x2400000)
                .part("dhtml", 0x7dc0000, 0x0240000),
        )
        .version(Version::new(InterfaceId::Bootloader).codecfg(CodeCfg {
            rwcode: 0x84010000,
            buffer: 0x85f00000,
            ..Default::default()
        }))
        .version(
            Version::new(InterfaceId::Bootloader)
                .name("2.5.0alpha8R2")
                .magic(0x83f8ecc8, b"2.5.0alpha8R2")
                .codecfg(CodeCfg { printf: 0x83f8b670, ..Default::default() })
                .func(
                    "flash",
                    "read",
                    Func::new(0x83f83740, ArgsMode::BufOffLen).patch(0x83f838e4, 0x10000018),
                )
                .func("nvram", "read", Func::new(0x83f81328, ArgsMode::OffBufLen)),
        )
        .build()
}

fn sbg6580() -> Arc<Profile> {
    Profile::new("sbg6580", "Motorola Surfboard SBG6580")
        .pssig(0xc055)
        .encryption(Encryption::Motorola)
        .cfg_flags(CfgFlag::GwsFullEnc.into())
        .md5_key(MD5_KEY_GENERIC)
        .space(AddrSpace::ram(0, 0))
        .build()
}

fn fast3686() -> Arc<Profile> {
    Profile::new("fast3686", "Sagemcom F@ST 3686")
        .arch("bcm3384")
        .pssig(0xd06e)
        .blsig(0x3384)
        .kseg1(0x20000000)
        .encryption(Encryption::Xor)
        .cfg_flags(CfgFlag::GwsFullEnc | CfgFlag::UserifAlt)
        .md5_key(MD5_KEY_GENERIC)
        .def_key("80")
        .magic(0x83f8f188, b"2.5.0beta8")
        .space(AddrSpace::ram(0x80000000, 0))
        .space(
            AddrSpace::new("nvram", 4 * MB)
                .part("bootloader", 0x000000, 0x10000)
                .part_alt("permnv", 0x010000, 0x20000, "perm")
                .part_alt("dynnv", 0x3c0000, 0x40000, "dyn"),
        )
        .space(
            AddrSpace::new("flash", 128 * MB)
                .part_alt("linuxapps", 0x0000000, 0x4c40000, "image3e")
                .part("image1", 0x4c40000, 0x0d80000)
                .part("image2", 0x59c0000, 0x0d80000)
                .part_alt("linux", 0x6740000, 0x0480000, "image3")
                .part("linuxkfs", 0x6bc0000, 0x1200000)
                .part("dhtml", 0x7dc0000, 0x0240000),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg {
                    rwcode: 0x80002000,
                    buffer: 0x88000000,
                    ..Default::default()
                })
                .opt("bfc:su_password", OptVal::Str("$agem001"))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("CVA-SIP_3.601.0")
                .magic(0x812df0e5, b"CVA-SIP_3.601.0-20190521")
                .opt("bfc:conthread_instance", OptVal::Num(0x818dd3c0))
                .func("flash", "open", Func::new(0x80438e6c, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x80438934, ArgsMode::BufOffLen).patch(0x80438ac4, 0x10000018),
                ),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("DNA_3.490.0")
                .magic(0x81082fa8, b"FAST3686_DNA_3.490.0-T3-20200429")
                .func("flash", "open", Func::new(0x803e1940, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x803e1408, ArgsMode::BufOffLen).patch(0x803e1598, 0x10000018),
                ),
        )
        .build()
}

fn fast3890() -> Arc<Profile> {
    Profile::new("fast3890", "Sagemcom F@ST 3890")
        .arch("bcm3390")
        .pssig(0x3390)
        .kseg1(0x20000000)
        .magic(0x83e05bb8, b"2.7.0alpha4")
        .space(AddrSpace::ram(0x80000000, 0))
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg { rwcode: 0x80002000, ..Default::default() })
                .opt("bfc:su_password", OptVal::Str("sagem"))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("50.10.11.T1")
                .magic(0x809864d9, b"50.10.11.T1")
                .opt("bfc:conthread_instance", OptVal::Num(0x80c2a68c)),
        )
        .build()
}

fn fast3286() -> Arc<Profile> {
    Profile::new("fast3286", "Sagemcom F@ST 3286")
        .encryption(Encryption::Xor)
        .cfg_flags(CfgFlag::GwsFullEnc | CfgFlag::UserifAltShort)
        .md5_key(MD5_KEY_GENERIC)
        .def_key("80")
        .space(AddrSpace::ram(0, 0))
        .space(
            AddrSpace::new("flash", 0)
                .part("bootloader", 0, 0)
                .part_alt("dynnv", 0, 0, "dyn")
                .part_alt("permnv", 0, 0, "perm")
                .part("image1", 0, 0)
                .part("image2", 0, 0)
                .part("image3", 0, 0)
                .part("image3e", 0, 0)
                .part("linux", 0, 0)
                .part("linuxapps", 0, 0)
                .part("linuxkfs", 0, 0)
                .part("dhtml", 0, 0),
        )
        .version(
            Version::new(InterfaceId::Bfc).opt("bfc:su_password", OptVal::Str("$agem001")),
        )
        .build()
}

fn mg7550() -> Arc<Profile> {
    Profile::new("mg7550", "Motorola MG7550")
        .pssig(0x7550)
        .kseg1(0x20000000)
        .md5_key(MD5_KEY_GENERIC)
        .space(AddrSpace::ram(0x80000000, 256 * MB))
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg { rwcode: 0x80002000, ..Default::default() }),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("5.7.1.27")
                .magic(0x80eb8a91, b"5.7.1.27")
                .opt("bfc:conthread_instance", OptVal::Num(0x812efff4))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .build()
}

fn mb7420() -> Arc<Profile> {
    Profile::new("mb7420", "Motorola MB7420")
        .pssig(0x3843)
        .kseg1(0x20000000)
        .space(AddrSpace::ram(0x80000000, 0))
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg { rwcode: 0x80002000, ..Default::default() }),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("5.7.1.19 MAC14")
                .magic(0x80624d91, b"5.7.1.19 MAC14")
                .opt("bfc:conthread_instance", OptVal::Num(0x8071e198))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("5.7.1.19")
                .magic(0x80624d91, b"5.7.1.19")
                .opt("bfc:conthread_instance", OptVal::Num(0x8071e170))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74)),
        )
        .build()
}

fn twg850() -> Arc<Profile> {
    Profile::new("twg850", "Thomson TWG850-4")
        .arch("bcm3368")
        .pssig(0xa815)
        .blsig(0x3345)
        .kseg1(0x20000000)
        .md5_key("544d4d5f5457473835302d3400000000")
        .magic(0x80f89da0, b"Oct 16 2007")
        .space(AddrSpace::ram(0x80000000, 32 * MB).part("bootloader", 0x80f80000, 0x010000))
        .space(
            AddrSpace::new("flash", 8 * MB)
                .part("image2", 0x000000, 0x3e0000)
                .part_alt("dynnv", 0x3e0000, 0x020000, "dyn")
                .part("bootloader", 0x400000, 0x010000)
                .part("image1", 0x410000, 0x3e0000)
                .part_alt("permnv", 0x7f0000, 0x010000, "perm"),
        )
        .build()
}

fn tcw770() -> Arc<Profile> {
    Profile::new("tcw770", "Thomson TCW770")
        .md5_key("544d4d5f544357373730000000000000")
        .space(AddrSpace::ram(0, 0))
        .build()
}

fn twg870() -> Arc<Profile> {
    Profile::new("twg870", "Thomson TWG870")
        .arch("bcm3380")
        .pssig(0xa81b)
        .blsig(0x3380)
        .encryption(Encryption::Aes256Ecb)
        .padding(Padding::ZeroBlock)
        .cfg_flags(CfgFlag::GwsPadOptional.into())
        .md5_key("544d4d5f545747383730000000000000")
        .def_key("0001020304050607080910111213141516171819202122232425262728293031")
        .magic(0x82f00014, b"TWG870")
        .space(
            AddrSpace::ram(0x80000000, 64 * MB)
                .part("image", 0x82f00000, 0x3e0000)
                .part("bootloader", 0x83f80000, 0x010000),
        )
        .space(
            AddrSpace::new("flash", 8 * MB)
                .part("bootloader", 0x000000, 0x008000)
                .part("unknown", 0x008000, 0x008000)
                .part_alt("permnv", 0x010000, 0x010000, "perm")
                .part("image1", 0x020000, 0x3e0000)
                .part("image2", 0x400000, 0x3e0000)
                .part_alt("dynnv", 0x7e0000, 0x010000, "dyn"),
        )
        .build()
}

fn evm3236() -> Arc<Profile> {
    Profile::new("evm3236", "Ubee EVM3236")
        .kseg1(0x20000000)
        .magic(0x807023d4, b"EVM3236")
        .space(AddrSpace::ram(0x80000000, 256 * MB))
        .space(
            AddrSpace::new("flash", 8 * MB)
                .part("bootloader", 0x000000, 0x008000)
                .part("unknown", 0x008000, 0x008000)
                .part_alt("permnv", 0x010000, 0x010000, "perm")
                .part("image1", 0x020000, 0x3e0000)
                .part("image2", 0x400000, 0x3e0000)
                .part_alt("dynnv", 0x7e0000, 0x010000, "dyn"),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg { rwcode: 0x80002000, ..Default::default() }),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("7.18.1009")
                .magic(0x8070244c, b"7.18.1009")
                .opt("bfc:conthread_instance", OptVal::Num(0x808bc084))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x6c)),
        )
        .build()
}

fn evw32c() -> Arc<Profile> {
    Profile::new("evw32c", "Ubee EVW32C")
        .pssig(0x1007)
        .blsig(0x3384)
        .kseg1(0x20000000)
        .encryption(Encryption::Aes128Cbc)
        .padding(Padding::Pkcs7)
        .cfg_flags(CfgFlag::GwsFullEnc | CfgFlag::GwsLenPrefix)
        .md5_key(MD5_KEY_GENERIC)
        // key, followed by initialization vector
        .def_key("6c3ea0477630ce21a2ce334aa746c2cdc782dc4c098c66cbd9cd27d825682c81")
        .magic(0x83f8e8a8, b"1.0.03")
        .space(AddrSpace::ram(0x80000000, 256 * MB))
        .space(
            AddrSpace::new("nvram", 0x100000)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("permnv", 0x10000, 0x20000, "perm")
                .part("unknown", 0x30000, 0x90000)
                .part_alt("dynnv", 0xc0000, 0x40000, "dyn"),
        )
        .space(
            AddrSpace::new("flash", 128 * MB)
                .part_alt("linuxapps", 0x0000000, 0x4c40000, "image3e")
                .part("image1", 0x4c40000, 0x0d80000)
                .part("image2", 0x59c0000, 0x0d80000)
                .part_alt("linux", 0x6740000, 0x0480000, "image3")
                .part("linuxkfs", 0x6bc0000, 0x1200000)
                .part("dhtml", 0x7dc0000, 0x0240000),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .opt("bfc:su_password", OptVal::Str("ubeecable"))
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74))
                .opt("bfc:flash_reinit_on_retry", OptVal::Num(1))
                .opt("bfc:flash_read_direct", OptVal::Num(0)),
        )
        .version(
            Version::new(InterfaceId::Bfc).name("2.7.1002").magic(0x810a4390, b"2.7.1002-NCS"),
        )
        .build()
}

fn epc3008() -> Arc<Profile> {
    Profile::new("epc3008", "Cisco EPC3008")
        .arch("bcm3382")
        .pssig(0xa03a)
        .blsig(0xa03a)
        .kseg1(0x20000000)
        .space(AddrSpace::ram(0x80000000, 64 * MB))
        .space(
            AddrSpace::new("flash", 4 * MB)
                .part("bootloader", 0x000000, 0x010000)
                .part("permnv", 0x010000, 0x010000)
                .part("image1", 0x020000, 0x1e0000)
                .part("image2", 0x200000, 0x1e0000)
                .part("dynnv", 0x3e0000, 0x020000),
        )
        .version(Version::new(InterfaceId::Bootloader).codecfg(CodeCfg {
            rwcode: 0x80010000,
            buffer: 0x82f00000,
            ..Default::default()
        }))
        .version(
            Version::new(InterfaceId::Bootloader)
                .name("2.3.1_R3")
                .magic(0x83f8a18c, b"2.3.1_R3 Pre-release")
                .codecfg(CodeCfg {
                    printf: 0x83f87b18,
                    sscanf: 0x83f884ec,
                    getline: 0x83f877c4,
                    ..Default::default()
                })
                .func("flash", "read", Func::new(0x83f80dc0, ArgsMode::OffBufLen))
                .func("flash", "write", Func::new(0x83f80c48, ArgsMode::PtrBufOffLen))
                .func("flash", "erase", Func::new(0x83f80fb0, ArgsMode::OffLen)),
        )
        .build()
}

fn tc8715() -> Arc<Profile> {
    Profile::new("tc8715", "Technicolor TC8715")
        .pssig(0xa8ef)
        .kseg1(0x20000000)
        .space(AddrSpace::ram(0x80000000, 0))
        .space(
            AddrSpace::new("nvram", 0x100000)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("permnv", 0x10000, 0x20000, "perm")
                .part("eripv2", 0x30000, 0x20000)
                .part_alt("dynnv", 0xc0000, 0x40000, "dyn"),
        )
        .space(
            AddrSpace::new("flash", 128 * MB)
                .part("linuxapps", 0x0000000, 0x50c0000)
                .part("image1", 0x50c0000, 0x0900000)
                .part("image2", 0x59c0000, 0x0900000)
                .part("linux", 0x62c0000, 0x0900000)
                .part("linuxkfs", 0x6bc0000, 0x1200000)
                .part("dhtml", 0x7dc0000, 0x0240000),
        )
        .build()
}

fn tc7200() -> Arc<Profile> {
    Profile::new("tc7200", "Technicolor TC7200")
        .arch("bcm3383")
        .pssig(0xa825)
        .blsig(0x3386)
        .kseg1(0x20000000)
        .encryption(Encryption::Aes256Ecb)
        .padding(Padding::ZeroBlock)
        .cfg_flags(CfgFlag::GwsPadOptional.into())
        .md5_key("544d4d5f544337323030000000000000")
        .keyfun(keyfun_tc7200)
        .def_key("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
        .def_key("0001020304050607080910111213141516171819202122232425262728293031")
        .magic(0x83f8e618, b"2.4.0alpha18p1")
        .magic(0x85f00014, b"TC7200")
        .space(
            AddrSpace::ram(0x80000000, 128 * MB)
                .part("bootloader", 0x83f80000, 0x020000)
                .part("image", 0x85f00000, 0x6c0000)
                .part("linux", 0x87000000, 0x480000),
        )
        .space(
            AddrSpace::new("nvram", 0x100000)
                .part("bootloader", 0x00000, 0x10000)
                .part_alt("permnv", 0x10000, 0x10000, "perm")
                .part_alt("dynnv", 0xe0000, 0x20000, "dyn"),
        )
        .space(
            AddrSpace::new("flash", 64 * MB)
                .part_alt("linuxapps", 0x0000000, 0x19c0000, "image3e")
                .part("image1", 0x19c0000, 0x06c0000)
                .part("image2", 0x2080000, 0x06c0000)
                .part_alt("linux", 0x2740000, 0x0480000, "image3")
                .part("linuxkfs", 0x2bc0000, 0x1200000)
                .part("dhtml", 0x3dc0000, 0x0240000),
        )
        .version(Version::new(InterfaceId::Bootloader).codecfg(CodeCfg {
            rwcode: 0x80002000,
            buffer: 0x85f00000,
            ..Default::default()
        }))
        .version(
            Version::new(InterfaceId::Bootloader)
                .name("2.4.0alpha18p1")
                .magic(0x83f8e618, b"2.4.0alpha18p1")
                .codecfg(CodeCfg {
                    printf: 0x83f8b0c0,
                    sscanf: 0x83f8ba94,
                    getline: 0x83f8ad10,
                    ..Default::default()
                })
                .func(
                    "flash",
                    "read",
                    Func::new(0x83f831b4, ArgsMode::BufOffLen).patch(0x83f83380, 0x10000017),
                )
                .func("flash", "write", Func::new(0x83f82e98, ArgsMode::PtrBufOffLen))
                .func("flash", "erase", Func::new(0x83f82c08, ArgsMode::OffSize))
                .func("nvram", "read", Func::new(0x83f81298, ArgsMode::OffBufLen))
                .func("nvram", "write", Func::new(0x83f810bc, ArgsMode::PtrBufOffLen))
                .func("nvram", "erase", Func::new(0x83f814e0, ArgsMode::OffLen)),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .codecfg(CodeCfg {
                    rwcode: 0x80002000,
                    buffer: 0x85f00000,
                    buflen: 0x19c0000,
                    ..Default::default()
                })
                .opt("bfc:conthread_priv_off", OptVal::Num(0x74))
                .opt("bfc:su_password", OptVal::Str("brcm")),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("STD6.02.42")
                .magic(0x814e953c, b"STD6.02.42")
                .func("flash", "open", Func::new(0x803f72e4, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x803f6d90, ArgsMode::BufOffLen).patch(0x803f6f3c, 0x10000018),
                ),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("STD6.02.41")
                .magic(0x814e8eac, b"STD6.02.41")
                .func("flash", "open", Func::new(0x803f704c, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x803f6af8, ArgsMode::BufOffLen).patch(0x803f6ca4, 0x10000018),
                ),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("STD6.02.11")
                .magic(0x85f00014, b"TC7200U-D6.02.11")
                .func("flash", "open", Func::new(0x803e5fd4, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x803e5a80, ArgsMode::BufOffLen).patch(0x803e5c2c, 0x10000018),
                ),
        )
        .version(
            Version::new(InterfaceId::Bfc)
                .name("STD6.01.27")
                .magic(0x85f00014, b"TC7200U-D6.01.27")
                .opt("bfc:conthread_instance", OptVal::Num(0x81315c24))
                .func("flash", "open", Func::new(0x8039eabc, ArgsMode::OffEnd))
                .func(
                    "flash",
                    "read",
                    Func::new(0x8039e868, ArgsMode::BufOffLen).patch(0x8039e9bc, 0x10000018),
                ),
        )
        .build()
}

pub(crate) fn profiles() -> Vec<Arc<Profile>> {
    vec![
        generic(),
        debug(),
        cg3000(),
        cg3101(),
        cbw383zn(),
        ch7485e(),
        c6300bd(),
        sbg6580(),
        fast3686(),
        fast3890(),
        fast3286(),
        mg7550(),
        mb7420(),
        twg850(),
        tcw770(),
        twg870(),
        evm3236(),
        evw32c(),
        epc3008(),
        tc8715(),
        tc7200(),
    ]
}
