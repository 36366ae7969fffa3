// PHP snippets evaluated through `pfsense.exec_php`.
//
// Each snippet assigns its result to `$toreturn`. The first line is a
// `// pfwatch:<operation>` marker so logs and test transports can tell the
// snippets apart without parsing PHP.

use crate::args::{GatewayName, ShellCommand, StateFilter, php_quote};

const TAG_PREFIX: &str = "// pfwatch:";

/// Extract the operation tag from a snippet built by this module.
pub fn op_tag(script: &str) -> Option<&str> {
    script
        .lines()
        .next()
        .and_then(|line| line.strip_prefix(TAG_PREFIX))
        .map(str::trim)
}

fn tagged(op: &str, body: &str) -> String {
    format!("{TAG_PREFIX}{op}\n{body}")
}

pub(crate) fn system_info() -> String {
    tagged(
        "system_info",
        r"global $config;
$toreturn = [
    'hostname' => $config['system']['hostname'],
    'domain' => $config['system']['domain'],
    'netgate_device_id' => system_get_uniqueid(),
    'platform' => system_identify_specific_platform()['descr'],
];",
    )
}

pub(crate) fn interface_stats() -> String {
    tagged(
        "interface_stats",
        r"require_once '/etc/inc/interfaces.inc';
$toreturn = [];
foreach (get_configured_interface_with_descr(true) as $ifname => $descr) {
    $ifinfo = get_interface_info($ifname);
    $ifinfo['descr'] = $descr;
    $toreturn[$ifname] = $ifinfo;
}",
    )
}

/// `system_get_dhcpleases()` does a reverse lookup per lease unless told
/// DNS is unavailable.
pub(crate) fn dhcp_leases(resolve_hostnames: bool) -> String {
    let dns = if resolve_hostnames { "true" } else { "false" };
    tagged(
        "dhcp_leases",
        &format!(
            r"require_once '/etc/inc/system.inc';
$resolve_hostnames = {dns};
$leases = system_get_dhcpleases($resolve_hostnames);
$toreturn = array_values($leases['lease'] ?? []);"
        ),
    )
}

pub(crate) fn vpn_sessions() -> String {
    tagged(
        "vpn_sessions",
        r"require_once '/etc/inc/openvpn.inc';
$toreturn = [
    'servers' => array_values(openvpn_get_active_servers()),
    'clients' => array_values(openvpn_get_active_clients()),
];",
    )
}

pub(crate) fn load_averages() -> String {
    tagged("load_averages", r"$toreturn = ['loadavg' => sys_getloadavg()];")
}

/// Installed vs. available firmware. `use_cache = false` forces the
/// appliance to query its update server.
pub(crate) fn firmware_status(use_cache: bool) -> String {
    let (op, cache) = if use_cache {
        ("firmware_status", "true")
    } else {
        ("firmware_check", "false")
    };
    tagged(
        op,
        &format!(
            r"require_once '/etc/inc/pkg-utils.inc';
$toreturn = get_system_pkg_version(false, {cache});"
        ),
    )
}

pub(crate) fn firmware_update() -> String {
    tagged(
        "firmware_update",
        r"mwexec_bg('/usr/local/sbin/pfSense-upgrade -y -l /cf/conf/upgrade_log.txt -p /tmp/pfSense-upgrade.sock');
$toreturn = ['started' => true];",
    )
}

pub(crate) fn carp_status() -> String {
    tagged(
        "carp_status",
        r#"global $config;
require_once '/etc/inc/interfaces.inc';
$vips = [];
foreach (($config['virtualip']['vip'] ?? []) as $vip) {
    if ($vip['mode'] != 'carp') {
        continue;
    }
    $vips[] = [
        'interface' => $vip['interface'],
        'vhid' => $vip['vhid'],
        'subnet' => $vip['subnet'],
        'status' => get_carp_interface_status("_vip{$vip['uniqid']}"),
    ];
}
$toreturn = ['enabled' => (bool) get_carp_status(), 'vips' => $vips];"#,
    )
}

pub(crate) fn arp_table(resolve_hostnames: bool) -> String {
    let dns = if resolve_hostnames { "true" } else { "false" };
    tagged(
        "arp_table",
        &format!(
            r"require_once '/etc/inc/util.inc';
$toreturn = array_values(system_get_arp_table({dns}));"
        ),
    )
}

pub(crate) fn exec_command(command: &ShellCommand) -> String {
    tagged(
        "exec_command",
        &format!(
            r#"exec({} . ' 2>&1', $out, $rc);
$toreturn = ['output' => implode("\n", $out), 'exit_code' => $rc];"#,
            php_quote(command.as_str())
        ),
    )
}

pub(crate) fn reset_state_table() -> String {
    tagged(
        "reset_state_table",
        r"require_once '/etc/inc/filter.inc';
filter_flush_state_table();
$toreturn = true;",
    )
}

pub(crate) fn kill_states(filter: &StateFilter) -> String {
    tagged(
        "kill_states",
        &format!(
            r#"exec('/sbin/pfctl {} 2>&1', $out, $rc);
$toreturn = ['output' => implode("\n", $out), 'exit_code' => $rc];"#,
            filter.pfctl_args()
        ),
    )
}

pub(crate) fn set_default_gateway(gateway: &GatewayName) -> String {
    tagged(
        "set_default_gateway",
        &format!(
            r"global $config;
require_once '/etc/inc/gwlb.inc';
$gw = {};
$found = false;
foreach (return_gateways_array() as $name => $g) {{
    if ($name == $gw) {{
        $found = true;
        $key = $g['ipprotocol'] == 'inet6' ? 'defaultgw6' : 'defaultgw4';
        $config['gateways'][$key] = $gw;
    }}
}}
if ($found) {{
    write_config('pfwatch: set default gateway');
    system_routing_configure();
    system_resolvconf_generate();
    filter_configure();
}}
$toreturn = ['found' => $found];",
            php_quote(gateway.as_str())
        ),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_snippet_is_tagged() {
        assert_eq!(op_tag(&system_info()), Some("system_info"));
        assert_eq!(op_tag(&firmware_status(true)), Some("firmware_status"));
        assert_eq!(op_tag(&firmware_status(false)), Some("firmware_check"));
        assert_eq!(op_tag("echo 1;"), None);
    }

    #[test]
    fn dhcp_snippet_can_disable_reverse_lookups() {
        assert!(dhcp_leases(false).contains("$resolve_hostnames = false;"));
        assert!(dhcp_leases(true).contains("$resolve_hostnames = true;"));
    }

    #[test]
    fn command_is_quoted() {
        let cmd = ShellCommand::new("echo 'hi'").unwrap();
        assert!(exec_command(&cmd).contains(r"exec('echo \'hi\'' . ' 2>&1'"));
    }
}
