//! The built-in settings group layouts.
//!
//! Layouts were recovered from firmware and settings file analysis; unnamed
//! members are bytes whose meaning is not known. A member gated on a group
//! version is *disabled* rather than omitted, so the declared layout stays
//! uniform across versions.

use std::sync::Arc;

use crate::compound::IsEnd;
use crate::val::{
    NvBitmask, NvBool, NvData, NvEnum, NvI32, NvIp4, NvIp6, NvMac, NvString, NvTimestamp, NvU16,
    NvU32, NvU8, NvVersion,
};
use crate::{Format, GroupDef, Named, NvArray, NvCompound, NvPList, NvVal, PrefixWidth};

fn var(name: &str, val: Box<dyn NvVal>) -> Named {
    Named::new(name, val)
}

// a version-gated member: disabled unless `cond` holds
fn gated(cond: bool, name: &str, mut val: Box<dyn NvVal>) -> Named {
    val.set_disabled(!cond);
    Named::new(name, val)
}

fn unknown(width: usize) -> Named {
    Named::new("", Box::new(NvData::new(width)))
}

fn u8_hex() -> Named {
    Named::new("", Box::new(NvU8::hex()))
}

fn opaque_body(body_size: usize) -> Vec<Named> {
    if body_size != 0 {
        vec![var("_data", Box::new(NvData::new(body_size)))]
    } else {
        Vec::new()
    }
}

fn is_zero_mac() -> IsEnd {
    Box::new(|v: &dyn NvVal| v.to_str() == "00:00:00:00:00:00")
}

/// The `MLog` group: user interface accounts and remote access.
struct UserIf;

impl GroupDef for UserIf {
    fn magic(&self) -> [u8; 4] {
        *b"MLog"
    }

    fn name(&self) -> &'static str {
        "userif"
    }

    fn definition(&self, _format: Format, ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        let v = ver.num();

        vec![
            var("http_user", Box::new(NvString::p16string(32))),
            var("http_pass", Box::new(NvString::p16string(32))),
            var("http_admin_user", Box::new(NvString::p16string(32))),
            var("http_admin_pass", Box::new(NvString::p16string(32))),
            var("telnet_enabled", Box::new(NvBool::new())),
            var("remote_acc_user", Box::new(NvString::zstring(16))),
            var("remote_acc_pass", Box::new(NvString::zstring(16))),
            var("telnet_ipstacks", Box::new(NvBitmask::<u8>::new())),
            gated(v > 0x0006, "ssh_ip_stacks", Box::new(NvBitmask::<u8>::new())),
            gated(v > 0x0006, "ssh_enabled", NvU8::boxed()),
            gated(v > 0x0006, "http_enabled", NvU8::boxed()),
            gated(v > 0x0006, "remote_acc_timeout", NvU16::boxed()),
            var("http_ipstacks", Box::new(NvBitmask::<u8>::new())),
            var("http_adv_ipstacks", Box::new(NvBitmask::<u8>::new())),
        ]
    }
}

/// The `CMAp` group: BFC console behaviour.
struct Bfc;

impl GroupDef for Bfc {
    fn magic(&self) -> [u8; 4] {
        *b"CMAp"
    }

    fn name(&self) -> &'static str {
        "bfc"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            var("stop_at_console", Box::new(NvBool::new())),
            var("skip_driver_init_prompt", Box::new(NvBool::new())),
            var("stop_at_console_prompt", Box::new(NvBool::new())),
            var(
                "serial_console_mode",
                Box::new(NvEnum::<u8>::new(
                    "serial_console_mode",
                    &["disabled", "ro", "rw", "factory"],
                )),
            ),
        ]
    }
}

/// The `THOM` group: Thomson BFC extensions.
struct ThomBfc;

impl GroupDef for ThomBfc {
    fn magic(&self) -> [u8; 4] {
        *b"THOM"
    }

    fn name(&self) -> &'static str {
        "thombfc"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            // 0x6 = rw (0x4 = write, 0x2 = read)
            var("serial_console_mode", Box::new(NvBitmask::<u8>::new())),
        ]
    }
}

/// The `8021`/`8022` groups: Broadcom wifi settings, one per card.
struct BcmWifi {
    card2: bool,
}

fn wmm_params() -> Box<dyn NvVal> {
    let cwminaifs = || Box::new(NvU16::ranged(0, 15));
    let cwmax = || Box::new(NvU16::ranged(0, 1024));
    let txop = || Box::new(NvU16::ranged(0, 8192));

    NvCompound::boxed(
        "wmm-params",
        vec![
            var("cwmin", cwminaifs()),
            var("cwmax", cwmax()),
            var("aifsn", cwminaifs()),
            var("txop_b", txop()),
            var("txop_ag", txop()),
        ],
    )
}

fn wmm_block() -> Box<dyn NvVal> {
    NvCompound::boxed(
        "wmm-block",
        vec![
            var("sta", wmm_params()),
            var("ap", wmm_params()),
            var("ap_adm_control", Box::new(NvBool::new())),
            var("ap_oldest_first", Box::new(NvBool::new())),
        ],
    )
}

fn wmm() -> Box<dyn NvVal> {
    NvCompound::boxed(
        "wmm",
        vec![
            var("ac_be", wmm_block()),
            var("ac_bk", wmm_block()),
            var("ac_vi", wmm_block()),
            var("ac_vo", wmm_block()),
        ],
    )
}

impl GroupDef for BcmWifi {
    fn magic(&self) -> [u8; 4] {
        if self.card2 {
            *b"8022"
        } else {
            *b"8021"
        }
    }

    fn name(&self) -> &'static str {
        if self.card2 {
            "bcmwifi2"
        } else {
            "bcmwifi"
        }
    }

    fn definition(&self, format: Format, ver: &NvVersion, body_size: usize) -> Vec<Named> {
        // known versions: 0x0015 TWG850, 0x001d TWG870, 0x0021 TCW770,
        // 0x0024 TC7200. Only 0x0015 needs special care.
        let v = ver.num();

        if format == Format::Perm {
            return opaque_body(body_size);
        }

        let rates = NvEnum::<u8>::with_values(
            "rate_mbps",
            &[
                (0x00, "auto"),
                (0x02, "1"),
                (0x04, "2"),
                (0x0b, "5.5"),
                (0x0c, "6"),
                (0x12, "9"),
                (0x16, "11"),
                (0x18, "12"),
                (0x24, "18"),
                (0x30, "24"),
                (0x48, "36"),
                (0x60, "48"),
                (0x6c, "54"),
            ],
        );

        vec![
            var("ssid", Box::new(NvString::zstring(33))),
            u8_hex(),
            var("channel_b", NvU8::boxed()),
            u8_hex(),
            // 0x0f = all
            var("basic_rates", NvU8::boxed()),
            unknown(3),
            var(
                "encryption",
                Box::new(NvEnum::<u8>::new(
                    "encryption",
                    &["none", "wep64", "wep128", "tkip", "aes", "tkip_aes"],
                )),
            ),
            unknown(2),
            var("wep64_keys", NvArray::boxed("wep64_keys", 4, || Box::new(NvData::new(5)), None)),
            var("wep_key_num", NvU8::boxed()),
            var("wep128_key_1", Box::new(NvData::new(13))),
            var("beacon_interval", Box::new(NvU16::ranged(20, 1024))),
            var("dtim_interval", Box::new(NvU16::ranged(1, 255))),
            var("frag_threshold", Box::new(NvU16::ranged(256, 2346))),
            var("rts_threshold", Box::new(NvU16::ranged(1, 2347))),
            var(
                "wep128_keys",
                NvArray::boxed("wep128_keys", 3, || Box::new(NvData::new(13)), None),
            ),
            var(
                "mac_policy",
                Box::new(NvEnum::<u8>::new("mac_policy", &["disabled", "allow", "deny"])),
            ),
            var(
                "mac_table",
                NvArray::boxed("mac_table", 32, || Box::new(NvMac::new()), Some(is_zero_mac())),
            ),
            u8_hex(),
            var("hide_ssid", Box::new(NvBool::new())),
            u8_hex(),
            unknown(0x20),
            var("short_retry_limit", NvU8::boxed()),
            var("long_retry_limit", NvU8::boxed()),
            u8_hex(),
            var("channel_a", NvU8::boxed()),
            // 1 = auto, 4 = performance, 5 = lrs
            var(
                "g_mode",
                Box::new(NvEnum::<u8>::new(
                    "g_mode",
                    &["disabled", "auto", "", "", "", "performance", "lrs"],
                )),
            ),
            var("radio_disabled", Box::new(NvBool::new())),
            var("g_protection", Box::new(NvBool::new())),
            unknown(1),
            var("g_rate_mbps", Box::new(rates)),
            var("tx_power", Box::new(NvU8::ranged(0, 100))),
            var("wpa_psk", Box::new(NvString::p16string(0))),
            unknown(0x2),
            var("group_key_rotation_interval", NvU16::boxed()),
            var("radius_ip", Box::new(NvIp4::new())),
            var("radius_port", NvU16::boxed()),
            u8_hex(),
            var("radius_key", Box::new(NvString::p8string(0))),
            unknown((if v <= 0x0015 { 0x56 } else { 0x2a }) - 0x1d),
            var("wds_enabled", Box::new(NvBool::new())),
            var("wds_list", NvArray::boxed("wds_list", 4, || Box::new(NvMac::new()), None)),
            var("enable_afterburner", Box::new(NvBool::new())),
            unknown(3),
            var(
                "wpa",
                Box::new(NvBitmask::<u8>::with_names("wpa", &["", "wpa1", "psk1", "wpa2", "psk2"])),
            ),
            unknown(2),
            var("wpa_reauth_interval", NvU16::boxed()),
            unknown(4),
            var("wmm_enabled", Box::new(NvBool::new())),
            var("wmm_nak", Box::new(NvBool::new())),
            var("wmm_powersave", Box::new(NvBool::new())),
            unknown(4),
            var("wmm", wmm()),
            gated(
                v > 0x0015,
                "n",
                NvCompound::boxed(
                    "n",
                    vec![
                        var("bss_opmode_cap_required", NvU8::boxed()),
                        var("channel", NvU8::boxed()),
                        u8_hex(),
                        var("bandwidth", NvU8::boxed()),
                        var("sideband", Box::new(NvU8::hex())),
                        u8_hex(),
                        u8_hex(),
                    ],
                ),
            ),
            gated(v <= 0x0015, "", Box::new(NvData::new(7))),
            var("wps_enabled", Box::new(NvBool::new())),
            var("wps_cfg_state", Box::new(NvU8::hex())),
            var("wps_device_pin", Box::new(NvString::p8zstring())),
            var("wps_model", Box::new(NvString::p8zstring())),
            var("wps_manufacturer", Box::new(NvString::p8zstring())),
            var("wps_device_name", Box::new(NvString::p8zstring())),
            unknown(3),
            var("wps_model_num", Box::new(NvString::p8zstring())),
            unknown(2),
            var("wps_uuid", Box::new(NvString::p8zstring())),
            var("wps_board_num", Box::new(NvString::p8zstring())),
            u8_hex(),
            var("country", Box::new(NvString::p8zstring())),
            var("", Box::new(NvBool::new())), // radio_enabled_n ??
            unknown(0x5),
            var("pre_network_radar_check", NvU8::boxed()),
            var("in_network_radar_check", NvU8::boxed()),
        ]
    }
}

/// The `T802` group: Thomson wifi extensions.
struct TmmWifi;

impl GroupDef for TmmWifi {
    fn magic(&self) -> [u8; 4] {
        *b"T802"
    }

    fn name(&self) -> &'static str {
        "tmmwifi"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            var("wifi_sleep", Box::new(NvData::new(14))),
            var("ssid_24", Box::new(NvString::fzstring(33))),
            var("ssid_50", Box::new(NvString::fzstring(33))),
            u8_hex(),
            var("wpa_psk_24", Box::new(NvString::p8string(0))),
            u8_hex(),
            var("wpa_psk_50", Box::new(NvString::p8string(0))),
            unknown(4),
            var("wifi_opt60_replace", Box::new(NvString::fzstring(33))),
            unknown(8),
            var("card1_prefix", Box::new(NvString::fstring(33))),
            // the firmware refers to this as "Card-1 Ramdon"
            var("card1_random", Box::new(NvString::fzstring(33))),
            var("card2_prefix", Box::new(NvString::fzstring(33))),
            var("card2_random", Box::new(NvString::fzstring(33))),
            var("card1_regul_rev", NvU8::boxed()),
            var("card2_regul_rev", NvU8::boxed()),
        ]
    }
}

/// The `RG..` group: residential gateway settings.
struct Rg;

fn ip4_range() -> Box<dyn NvVal> {
    NvCompound::boxed(
        "ip4-range",
        vec![var("start", Box::new(NvIp4::new())), var("end", Box::new(NvIp4::new()))],
    )
}

fn port_range() -> Box<dyn NvVal> {
    NvCompound::boxed(
        "port-range",
        vec![var("start", NvU16::boxed()), var("end", NvU16::boxed())],
    )
}

fn proto() -> Box<dyn NvVal> {
    Box::new(NvEnum::<u8>::with_values(
        "protocol",
        &[(0x3, "TCP"), (0x4, "UDP"), (0xfe, "TCP+UDP")],
    ))
}

fn route(route1: bool) -> Box<dyn NvVal> {
    NvCompound::boxed(
        "route",
        vec![
            var(if route1 { "netmask" } else { "network" }, Box::new(NvIp4::new())),
            var(if route1 { "network" } else { "gateway" }, Box::new(NvIp4::new())),
            var(if route1 { "gateway" } else { "netmask" }, Box::new(NvIp4::new())),
        ],
    )
}

fn is_port_range(v: &dyn NvVal, start: &str, end: &str) -> bool {
    v.get("start").map(|s| s.to_str() == start).unwrap_or(false)
        && v.get("end").map(|e| e.to_str() == end).unwrap_or(false)
}

impl GroupDef for Rg {
    fn magic(&self) -> [u8; 4] {
        *b"RG.."
    }

    fn name(&self) -> &'static str {
        "rg"
    }

    fn definition(&self, _format: Format, ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        // TWG870: version 0x0016 (0.22)
        let v = ver.num();

        let features1 = NvBitmask::<u32>::with_names(
            "features1",
            &[
                "wan_conn_pppoe",
                "", // 0x02 (unset by default, automatically removed if set)
                "feature_ip_filters",
                "feature_port_filters",
                "wan_block_pings",
                "feature_ipsec_passthrough",
                "feature_pptp_passthrough",
                "wan_remote_cfg_mgmt",
                "feature_ip_forwarding", // 0x0100 (unset by default)
                "feature_dmz",
                "wan_conn_static",
                "feature_nat_debug",
                "lan_dhcp_server",
                "lan_http_server",
                "primary_default_override",
                "feature_mac_filters",
                "feature_port_triggers",
                "feature_multicast",
                "wan_rip",
                "", // 0x080000 (unset by default)
                "feature_dmz_by_hostname",
                "lan_upnp",
                "lan_routed_subnet",
                "lan_routed_subnet_dhcp",
                "wan_passthrough_skip_dhcp",
                "lan_routed_subnet_nat",
                "", // 0x04000000
                "wan_sntp",
                "wan_conn_pptp",
                "wan_pptp_server",
                "feature_ddns",
                "", // 0x80000000
            ],
        );

        vec![
            var("router_mode", Box::new(NvBool::new())),
            var("http_pass", Box::new(NvString::zstring(9))),
            var("http_realm", Box::new(NvString::zstring(256))),
            var("spoofed_mac", Box::new(NvMac::new())),
            var("features1", Box::new(features1)),
            var("dmz_ip", Box::new(NvIp4::new())),
            var("wan_ip", Box::new(NvIp4::new())),
            var("wan_mask", Box::new(NvIp4::new())),
            var("wan_gateway", Box::new(NvIp4::new())),
            var("wan_dhcp_hostname", Box::new(NvString::fzstring(0x100))),
            var("syslog_email", Box::new(NvString::fzstring(0x100))),
            var("syslog_smtp", Box::new(NvString::fzstring(0x100))),
            var(
                "ip_filters",
                NvArray::boxed("ip_filters", 10, ip4_range, Some(Box::new(|v: &dyn NvVal| {
                    v.get("start").map(|s| s.to_str() == "0.0.0.0").unwrap_or(false)
                        && v.get("end").map(|e| e.to_str() == "0.0.0.0").unwrap_or(false)
                }))),
            ),
            var(
                "port_filters",
                NvArray::boxed(
                    "port_filters",
                    10,
                    port_range,
                    Some(Box::new(|v: &dyn NvVal| is_port_range(v, "1", "65535"))),
                ),
            ),
            var(
                "port_forwards",
                NvArray::boxed(
                    "port_forwards",
                    10,
                    || {
                        NvCompound::boxed(
                            "port-forward",
                            vec![
                                var("dest", Box::new(NvIp4::new())),
                                var("ports", port_range()),
                                var("type", proto()),
                            ],
                        )
                    },
                    Some(Box::new(|v: &dyn NvVal| {
                        v.get("dest").map(|d| d.to_str() == "0.0.0.0").unwrap_or(false)
                    })),
                ),
            ),
            var(
                "mac_filters",
                NvArray::boxed("mac_filters", 20, || Box::new(NvMac::new()), Some(is_zero_mac())),
            ),
            var(
                "port_triggers",
                NvArray::boxed(
                    "port_triggers",
                    10,
                    || {
                        NvCompound::boxed(
                            "port-trigger",
                            vec![var("trigger", port_range()), var("target", port_range())],
                        )
                    },
                    Some(Box::new(|v: &dyn NvVal| {
                        v.get("trigger").map(|t| is_port_range(t, "0", "0")).unwrap_or(false)
                    })),
                ),
            ),
            unknown(0x15),
            var(
                "port_filter_protocols",
                NvArray::boxed("port_filter_protocols", 10, proto, None),
            ),
            unknown(0xaa),
            var(
                "port_trigger_protocols",
                NvArray::boxed("port_trigger_protocols", 10, proto, None),
            ),
            unknown(0x443),
            unknown(3),
            var("rip_key", Box::new(NvString::p8string(0))),
            var("rip_reporting_interval", NvU16::boxed()),
            unknown(0xa),
            var("route1", route(true)),
            var("route2", route(false)),
            var("route3", route(false)),
            var("nat_route_gateway", Box::new(NvIp4::new())),
            var(
                "nat_route_dns",
                NvArray::boxed("nat_route_dns", 3, || Box::new(NvIp4::new()), None),
            ),
            var("l2tp_username", Box::new(NvString::p8string(0))),
            var("l2tp_password", Box::new(NvString::p8string(0))),
            unknown(5),
            var(
                "timeservers",
                NvPList::boxed("timeservers", PrefixWidth::U8, || {
                    Box::new(NvString::p8string(0))
                }),
            ),
            var("timezone_offset", Box::new(NvI32::ranged(-45000, 45000))),
            gated(
                v > 0x0016,
                "port_forward_dports",
                NvArray::boxed(
                    "port_forward_dports",
                    10,
                    || {
                        NvCompound::boxed(
                            "port-forward-dport",
                            vec![var("ports", port_range()), var("data", Box::new(NvData::new(4)))],
                        )
                    },
                    Some(Box::new(|v: &dyn NvVal| {
                        v.get("ports").map(|p| is_port_range(p, "0", "0")).unwrap_or(false)
                    })),
                ),
            ),
            var("ddns_username", Box::new(NvString::p16string(0))),
            var("ddns_password", Box::new(NvString::p16string(0))),
            var("ddns_hostname", Box::new(NvString::p16string(0))),
            unknown(4),
            var("mtu", NvU16::boxed()),
            unknown(3),
            var(
                "features2",
                Box::new(NvBitmask::<u8>::with_names(
                    "features2",
                    &["wan_l2tp_server", "wan_conn_l2tp"],
                )),
            ),
            var("l2tp_server_ip", Box::new(NvIp4::new())),
            var("l2tp_server_name", Box::new(NvString::p8string(0))),
        ]
    }
}

/// The `CDP.` group: DHCP server state.
struct Dhcp;

fn ip4_typed() -> Box<dyn NvVal> {
    NvCompound::boxed(
        "typed-ip",
        vec![var("type", NvU32::boxed()), var("ip", Box::new(NvIp4::new()))],
    )
}

impl GroupDef for Dhcp {
    fn magic(&self) -> [u8; 4] {
        *b"CDP."
    }

    fn name(&self) -> &'static str {
        "dhcp"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            unknown(7),
            var("lan_trans_threshold", NvU8::boxed()),
            unknown(8),
            var("dhcp_pool_start", ip4_typed()),
            var("dhcp_pool_end", ip4_typed()),
            var("dhcp_subnet_mask", ip4_typed()),
            unknown(4),
            var("router_ip", ip4_typed()),
            var("dns_ip", ip4_typed()),
            var("syslog_ip", ip4_typed()),
            var("ttl", NvU32::boxed()),
            unknown(4),
            var("ip_2", ip4_typed()),
            var("domain", Box::new(NvString::p8string(0))),
            unknown(7),
            var(
                "lan_addrs",
                NvArray::boxed(
                    "lan_addrs",
                    16,
                    || {
                        NvCompound::boxed(
                            "lan-addr",
                            vec![
                                var("num_1", NvU16::boxed()),
                                var("create_time", NvU16::boxed()),
                                var("num_2", NvU16::boxed()),
                                var("expire_time", NvU16::boxed()),
                                var("ip_type", NvU8::boxed()),
                                var("ip", Box::new(NvIp4::new())),
                                var("ip_data", Box::new(NvData::new(3))),
                                var("method", NvU8::boxed()),
                                var("client_id", Box::new(NvString::p8data())),
                                var("hostname", Box::new(NvString::p8string(0))),
                                var("mac", Box::new(NvMac::new())),
                            ],
                        )
                    },
                    None,
                ),
            ),
            unknown(0x37a),
            var(
                "wan_dns",
                NvArray::boxed(
                    "wan_dns",
                    3,
                    || {
                        NvCompound::boxed(
                            "wan-dns-entry",
                            vec![u8_hex(), var("ip", Box::new(NvIp4::new()))],
                        )
                    },
                    None,
                ),
            ),
        ]
    }
}

/// The `FIRE` group: firewall settings.
struct Firewall;

impl GroupDef for Firewall {
    fn magic(&self) -> [u8; 4] {
        *b"FIRE"
    }

    fn name(&self) -> &'static str {
        "firewall"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            unknown(2),
            var(
                "features",
                Box::new(NvBitmask::<u16>::with_names(
                    "features",
                    &[
                        "keyword_blocking",
                        "domain_blocking",
                        "http_proxy_blocking",
                        "disable_cookies",
                        "disable_java_applets",
                        "disable_activex_ctrl",
                        "disable_popups",
                        "mac_tod_filtering",
                        "email_alerts",
                        "",
                        "",
                        "",
                        "block_fragmented_ip",
                        "port_scan_detection",
                        "syn_flood_detection",
                    ],
                )),
            ),
            unknown(4),
            var("word_filter_count", NvU8::boxed()),
            unknown(3),
            var("domain_filter_count", NvU8::boxed()),
            var(
                "word_filters",
                NvArray::boxed("word_filters", 16, || Box::new(NvString::fstring(0x20)), None),
            ),
            var(
                "domain_filters",
                NvArray::boxed("domain_filters", 16, || Box::new(NvString::fstring(0x40)), None),
            ),
            // room for 11 more domain filters, judging by the stride
            unknown(0x2d4),
            unknown(0xc),
            // 0x00 = all (!), 0x01 = sunday, 0x40 = saturday
            var("tod_filter_days", Box::new(NvBitmask::<u8>::new())),
            unknown(1),
            var("tod_filter_begin_h", Box::new(NvU8::ranged(0, 23))),
            var("tod_filter_end_h", Box::new(NvU8::ranged(0, 23))),
            var("tod_filter_begin_m", Box::new(NvU8::ranged(0, 59))),
            var("tod_filter_end_m", Box::new(NvU8::ranged(0, 59))),
            unknown(0x2a80),
            var("syslog_ip", Box::new(NvIp4::new())),
            unknown(2),
            // 0x08 = product config events, 0x04 = "known internet attacks",
            // 0x02 = blocked connections, 0x01 = permitted connections
            var("syslog_events", Box::new(NvBitmask::<u16>::new())),
        ]
    }
}

/// The `CMEV` group: cable modem event log.
struct CmLog;

impl GroupDef for CmLog {
    fn magic(&self) -> [u8; 4] {
        *b"CMEV"
    }

    fn name(&self) -> &'static str {
        "cmlog"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            u8_hex(), // maybe a p16list?
            var(
                "log",
                NvPList::boxed("log", PrefixWidth::U8, || {
                    NvCompound::boxed(
                        "log-entry",
                        vec![
                            var("data", Box::new(NvData::new(8))),
                            var("time1", Box::new(NvTimestamp::new())),
                            var("time2", Box::new(NvTimestamp::new())),
                            var("msg", Box::new(NvString::p16string(0))),
                        ],
                    )
                }),
            ),
        ]
    }
}

/// The `RSTL`/`CMBL`/`EMBL` groups: miscellaneous device logs.
struct DevLog {
    magic: [u8; 4],
    name: &'static str,
}

impl GroupDef for DevLog {
    fn magic(&self) -> [u8; 4] {
        self.magic
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            unknown(1),
            var(
                "log",
                NvPList::boxed("log", PrefixWidth::U8, || {
                    NvCompound::boxed(
                        "log-entry",
                        vec![
                            var("time", Box::new(NvTimestamp::new())),
                            var("msg", Box::new(NvString::p16istring())),
                            unknown(2),
                        ],
                    )
                }),
            ),
        ]
    }
}

/// The `UPC.` group: UPC-branded firmware settings.
struct Upc;

impl GroupDef for Upc {
    fn magic(&self) -> [u8; 4] {
        *b"UPC."
    }

    fn name(&self) -> &'static str {
        "upc"
    }

    fn definition(&self, _format: Format, _ver: &NvVersion, _body_size: usize) -> Vec<Named> {
        vec![
            unknown(10),
            var("parental_activity_time_enable", NvU16::boxed()),
            var("parental_password", Box::new(NvString::zstring(10))),
            unknown(0x2237),
            var("web_country", NvU8::boxed()),
            var("web_language", NvU8::boxed()),
            var("web_syslog_enable", Box::new(NvBool::new())),
            var("web_syslog_level", NvU8::boxed()),
            var(
                "trusted_macs",
                NvArray::boxed("trusted_macs", 10, || Box::new(NvMac::new()), Some(is_zero_mac())),
            ),
            unknown(0xd8),
            var(
                "lan_dns4_list",
                NvArray::boxed("lan_dns4_list", 3, || Box::new(NvIp4::new()), None),
            ),
            var(
                "lan_dns6_list",
                NvArray::boxed("lan_dns6_list", 3, || Box::new(NvIp6::new()), None),
            ),
        ]
    }
}

pub(crate) fn all() -> Vec<Arc<dyn GroupDef>> {
    vec![
        Arc::new(Bfc),
        Arc::new(UserIf),
        Arc::new(BcmWifi { card2: false }),
        Arc::new(BcmWifi { card2: true }),
        Arc::new(TmmWifi),
        Arc::new(Rg),
        Arc::new(Dhcp),
        Arc::new(Firewall),
        Arc::new(CmLog),
        Arc::new(Upc),
        Arc::new(DevLog { magic: *b"RSTL", name: "rstl" }),
        Arc::new(DevLog { magic: *b"CMBL", name: "cmbl" }),
        Arc::new(DevLog { magic: *b"EMBL", name: "embl" }),
        Arc::new(ThomBfc),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_groups() {
        let registry = crate::registry();

        for magic in [b"MLog", b"CMAp", b"8021", b"8022", b"T802", b"RG..", b"CDP.", b"FIRE"] {
            assert!(registry.contains_key(magic), "{magic:?}");
        }
    }

    #[test]
    fn test_group_names_are_unique() {
        let mut names: Vec<&str> = all().iter().map(|d| d.name()).collect();
        names.sort_unstable();
        let len = names.len();
        names.dedup();
        assert_eq!(names.len(), len);
    }
}
