//! Раскладка снапшота по точкам InfluxDB.
//!
//! Измерения: `energy_meters`, `energy_powerwalls`, `energy_configuration`,
//! `energy_network`, `energy_pv`, `energy_faults`, `energy_vitals`, каждое
//! с настраиваемым префиксом. Все точки несут общие теги площадки.

use super::line_protocol::Point;
use crate::collector::Snapshot;
use crate::model::{AlertBlock, Diagnostic};
use crate::vitals::{DeviceIdentity, InverterRecord};
use chrono::{DateTime, TimeZone};

fn ns<Tz: TimeZone>(t: &DateTime<Tz>) -> i64 {
    t.timestamp_nanos_opt().unwrap_or_default()
}

fn ns_opt<Tz: TimeZone>(t: &Option<DateTime<Tz>>) -> Option<i64> {
    t.as_ref().and_then(|t| t.timestamp_nanos_opt())
}

/// Общие теги площадки.
fn site_tags(snapshot: &Snapshot) -> Vec<(&str, &str)> {
    let status = &snapshot.status.data;
    let site = &snapshot.site_info.data;
    vec![
        ("gateway_id", status.gateway_id.as_str()),
        ("firmware_version", status.firmware_version.as_str()),
        ("firmware_git_hash", status.firmware_git_hash.as_str()),
        ("sync_type", status.sync_type.as_str()),
        ("site_name", site.site_name.as_str()),
        ("site_grid_code", site.grid_code.grid_code.as_str()),
        ("site_country", site.grid_code.country.as_str()),
        ("site_state", site.grid_code.state.as_str()),
        ("site_utility", site.grid_code.utility.as_str()),
    ]
}

/// Все точки одного снапшота.
pub fn snapshot_points(snapshot: &Snapshot, prefix: &str) -> Vec<Point> {
    let mut points = Vec::new();
    let measurement = |name: &str| format!("{prefix}{name}");
    let tags = site_tags(snapshot);

    points.push(meters_point(snapshot, measurement("energy_meters"), &tags));
    powerwall_points(snapshot, &measurement("energy_powerwalls"), &tags, &mut points);
    points.push(configuration_point(snapshot, measurement("energy_configuration"), &tags));
    network_points(snapshot, &measurement("energy_network"), &tags, &mut points);
    pv_points(snapshot, &measurement("energy_pv"), &tags, &mut points);
    fault_points(snapshot, &measurement("energy_faults"), &tags, &mut points);
    vitals_points(snapshot, &measurement("energy_vitals"), &tags, &mut points);

    points
}

fn meters_point(snapshot: &Snapshot, measurement: String, tags: &[(&str, &str)]) -> Point {
    let site = &snapshot.site_info.data;
    let mut point = Point::new(measurement, ns(&snapshot.meters.captured_at))
        .tags(tags.iter().copied())
        .tag("meter_serial", snapshot.meters_status.data.serial.as_str())
        .field("measured_frequency", site.measured_frequency)
        .field("max_system_energy_kwh", site.max_system_energy_kwh)
        .field("max_system_power_kw", site.max_system_power_kw)
        .field("max_site_meter_power_kw", site.max_site_meter_power_kw)
        .field("min_site_meter_power_kw", site.min_site_meter_power_kw)
        .field("nominal_system_energy_kwh", site.nominal_system_energy_kwh)
        .field("nominal_system_power_kw", site.nominal_system_power_kw)
        .field("panel_max_current", site.panel_max_current)
        .field("grid_voltage_setting", site.grid_code.grid_voltage_setting)
        .field("grid_frequency_setting", site.grid_code.grid_freq_setting)
        .field("meter_status", snapshot.meters_status.data.status.as_str());

    for (name, meter) in snapshot.meters.data.named() {
        point = point
            .field_opt(format!("{name}_last_comm_time"), ns_opt(&meter.last_communication_time))
            .field(format!("{name}_instant_power"), meter.instant_power_watts)
            .field(format!("{name}_instant_reactive_power"), meter.instant_reactive_power_watts)
            .field(format!("{name}_instant_apparent_power"), meter.instant_apparent_power_watts)
            .field(format!("{name}_frequency"), meter.frequency)
            .field(format!("{name}_energy_exported"), meter.energy_exported_watts)
            .field(format!("{name}_energy_imported"), meter.energy_imported_watts)
            .field(format!("{name}_instant_average_voltage"), meter.instant_average_voltage)
            .field(format!("{name}_instant_average_current"), meter.instant_average_current)
            .field(format!("{name}_instant_total_current"), meter.instant_total_current);
    }
    point
}

fn diagnostic_points(
    diagnostic: &Diagnostic,
    measurement: &str,
    timestamp: i64,
    tags: &[(&str, &str)],
    points: &mut Vec<Point>,
) {
    points.push(
        Point::new(measurement, timestamp)
            .tags(tags.iter().copied())
            .tag("diagnostic", diagnostic.name.as_str())
            .tag("category", diagnostic.category.as_str())
            .field("disruptive", diagnostic.disruptive)
            .field("alert", diagnostic.alert),
    );

    for check in &diagnostic.checks {
        points.push(
            Point::new(measurement, timestamp)
                .tags(tags.iter().copied())
                .tag("check_name", check.name.as_str())
                .tag("diagnostic", diagnostic.name.as_str())
                .tag("category", diagnostic.category.as_str())
                .field("check_status", check.status.as_str())
                .field_opt("check_start_time", ns_opt(&check.start_time))
                .field_opt("check_end_time", ns_opt(&check.end_time))
                .field("check_message", check.message.as_str()),
        );
    }
}

fn powerwall_points(
    snapshot: &Snapshot,
    measurement: &str,
    tags: &[(&str, &str)],
    points: &mut Vec<Point>,
) {
    let pw = &snapshot.powerwalls.data;
    let pw_ts = ns(&snapshot.powerwalls.captured_at);

    points.push(
        Point::new(measurement, pw_ts)
            .tags(tags.iter().copied())
            .field("enumerating", pw.enumerating)
            .field("updating", pw.updating)
            .field("checking_if_offgrid", pw.checking_if_offgrid)
            .field("running_phase_detection", pw.running_phase_detection)
            .field("bubble_shedding", pw.bubble_shedding)
            .field("grid_qualifying", pw.grid_qualifying)
            .field("grid_code_validating", pw.grid_code_validating)
            .field("phase_detection_not_available", pw.phase_detection_not_available)
            .field("on_grid_check_error", pw.on_grid_check_error.as_str())
            .field("phase_detection_last_error", pw.phase_detection_last_error.as_str())
            .field("sync_updating", pw.sync.updating)
            .field("charge_percent", snapshot.soe.data.percentage),
    );

    for diagnostic in pw.sync.diagnostics() {
        diagnostic_points(diagnostic, measurement, pw_ts, tags, points);
    }

    let ss = &snapshot.system_status.data;
    let ss_ts = ns(&snapshot.system_status.captured_at);
    points.push(
        Point::new(measurement, ss_ts)
            .tags(tags.iter().copied())
            .field("battery_target_power", ss.battery_target_power)
            .field("battery_target_reactive_power", ss.battery_target_reactive_power)
            .field("nominal_full_pack_energy", ss.nominal_full_pack_energy_watt_hours)
            .field(
                "nominal_energy_remaining_watt_hours",
                ss.nominal_energy_remaining_watt_hours,
            )
            .field("max_power_energy_remaining", ss.max_power_energy_remaining)
            .field("max_power_energy_to_be_charged", ss.max_power_energy_to_be_charged)
            .field("max_charge_power", ss.max_charge_power_watts)
            .field("max_discharge_power", ss.max_discharge_power_watts)
            .field("max_apparent_power", ss.max_apparent_power)
            .field("instantaneous_max_discharge_power", ss.instantaneous_max_discharge_power)
            .field("instantaneous_max_charge_power", ss.instantaneous_max_charge_power)
            .field("grid_services_power", ss.grid_services_power)
            .field("system_island_state", ss.system_island_state.as_str())
            .field("available_blocks", ss.available_blocks)
            .field("ffr_power_availability_high", ss.ffr_power_availability_high)
            .field("ffr_power_availability_low", ss.ffr_power_availability_low)
            .field("load_charge_constraint", ss.load_charge_constraint)
            .field("max_sustained_ramp_rate", ss.max_sustained_ramp_rate)
            .field("can_reboot", ss.can_reboot.as_str())
            .field("smart_inv_delta_p", ss.smart_inv_delta_p)
            .field("smart_inv_delta_q", ss.smart_inv_delta_q)
            .field_opt("last_toggle_timestamp", ns_opt(&ss.last_toggle_timestamp))
            .field("solar_real_power_limit", ss.solar_real_power_limit)
            .field("score", ss.score)
            .field("blocks_controlled", ss.blocks_controlled)
            .field("primary", ss.primary)
            .field("auxiliary_load", ss.auxiliary_load)
            .field("all_enable_lines_high", ss.all_enable_lines_high)
            .field("inverter_nominal_usable_power", ss.inverter_nominal_usable_power_watts)
            .field("expected_energy_remaining", ss.expected_energy_remaining),
    );

    for block in &ss.battery_blocks {
        points.push(
            Point::new(measurement, ss_ts)
                .tags(tags.iter().copied())
                .tag("powerwall_part_number", block.package_part_number.as_str())
                .tag("powerwall_serial_number", block.package_serial_number.as_str())
                .field("powerwall_pinv_state", block.pinv_state.as_str())
                .field("powerwall_pinv_grid_state", block.pinv_grid_state.as_str())
                .field(
                    "powerwall_nominal_energy_remaining",
                    block.nominal_energy_remaining_watt_hours,
                )
                .field("powerwall_nominal_full_pack_energy", block.nominal_full_pack_energy)
                .field("powerwall_charge_percent", block.charge_percent())
                .field("powerwall_p_out", block.p_out)
                .field("powerwall_q_out", block.q_out)
                .field("powerwall_v_out", block.v_out)
                .field("powerwall_f_out", block.f_out)
                .field("powerwall_i_out", block.i_out)
                .field("powerwall_energy_charged", block.energy_charged)
                .field("powerwall_energy_discharged", block.energy_discharged)
                .field("powerwall_off_grid", block.off_grid)
                .field("powerwall_vf_mode", block.vf_mode)
                .field("powerwall_wobble_detected", block.wobble_detected)
                .field("powerwall_charge_power_clamped", block.charge_power_clamped)
                .field("powerwall_backup_ready", block.backup_ready)
                .field("powerwall_op_seq_state", block.op_seq_state.as_str())
                .field("powerwall_disabled_reasons", block.disabled_reasons.join(",")),
        );
    }
}

fn configuration_point(snapshot: &Snapshot, measurement: String, tags: &[(&str, &str)]) -> Point {
    let op = &snapshot.operation.data;
    let sm = &snapshot.sitemaster.data;
    let grid = &snapshot.grid_status.data;
    Point::new(measurement, ns(&snapshot.operation.captured_at))
        .tags(tags.iter().copied())
        .field("mode", op.real_mode.as_str())
        .field("backup_reserve_percent", op.backup_reserve_percent)
        .field("freq_shift_load_shed_soe", op.freq_shift_load_shed_soe)
        .field("freq_shift_load_shed_delta_f", op.freq_shift_load_shed_delta_f)
        .field("net_meter_mode", snapshot.site_info.data.net_meter_mode.as_str())
        .field("sitemaster_status", sm.status.as_str())
        .field("sitemaster_running", sm.running)
        .field("sitemaster_connected_to_tesla", sm.connected_to_tesla)
        .field("sitemaster_power_supply_mode", sm.power_supply_mode)
        .field("sitemaster_can_reboot", sm.can_reboot.as_str())
        .field("grid_status", grid.grid_status.as_str())
        .field("grid_services_active", grid.grid_services_active)
        .field("update_state", snapshot.update_status.data.state.as_str())
        .field("system_testing_running", snapshot.system_testing.data.running)
        .field_opt(
            "uptime_seconds",
            snapshot.status.data.uptime.map(|d| d.as_secs_f64()),
        )
        .field_opt("start_time", ns_opt(&snapshot.status.data.start_time))
        .field("solar_count", snapshot.solars.data.len() as i64)
}

fn network_points(
    snapshot: &Snapshot,
    measurement: &str,
    tags: &[(&str, &str)],
    points: &mut Vec<Point>,
) {
    let net = &snapshot.network.data;
    let ts = ns(&snapshot.network.captured_at);

    points.push(
        Point::new(measurement, ts)
            .tags(tags.iter().copied())
            .tag("diagnostic", net.name.as_str())
            .tag("category", net.category.as_str())
            .field("disruptive", net.disruptive)
            .field("alert", net.alert),
    );

    for check in &net.checks {
        points.push(
            Point::new(measurement, ts)
                .tags(tags.iter().copied())
                .tag("check_name", check.name.as_str())
                .tag("diagnostic", net.name.as_str())
                .tag("category", net.category.as_str())
                .field("check_status", check.status.as_str())
                .field_opt("check_start_time", ns_opt(&check.start_time))
                .field_opt("check_end_time", ns_opt(&check.end_time)),
        );
    }
}

/// `PVAC_a009_SwAppBoot` -> `pvac_alerts_a009_swappboot`.
fn alert_field(block: &str, flag: &str) -> String {
    let prefix = block.to_uppercase() + "_";
    let short = flag.strip_prefix(&prefix).unwrap_or(flag);
    format!("{block}_alerts_{}", short.to_lowercase())
}

fn alert_block_fields(mut point: Point, block: &str, alerts: &AlertBlock) -> Point {
    point = point
        .field_opt(format!("{block}_alerts_last_rx_time"), ns_opt(&alerts.last_rx_time))
        .field(format!("{block}_alerts_receive_mux_bitmask"), alerts.received_mux_bitmask);
    for (flag, on) in &alerts.flags {
        point = point.field(alert_field(block, flag), *on);
    }
    point
}

fn pv_points(snapshot: &Snapshot, measurement: &str, tags: &[(&str, &str)], points: &mut Vec<Point>) {
    let solar = &snapshot.solar_powerwall.data;
    let ts = ns(&snapshot.solar_powerwall.captured_at);
    let pvac = &solar.pvac_status;
    let pvs = &solar.pvs_status;

    let mut point = Point::new(measurement, ts)
        .tags(tags.iter().copied())
        .field("pv_power_limit", solar.pv_power_limit)
        .field("power_status_setpoint", solar.power_status_setpoint.as_str())
        .field("pvac_state", pvac.state.as_str())
        .field("pvac_disabled", pvac.disabled)
        .field("pvac_disabled_reasons", pvac.disabled_reasons.join(","))
        .field("pvac_grid_state", pvac.grid_state.as_str())
        .field("pvac_inv_state", pvac.inv_state.as_str())
        .field("pvac_v_out", pvac.v_out)
        .field("pvac_f_out", pvac.f_out)
        .field("pvac_p_out", pvac.p_out)
        .field("pvac_q_out", pvac.q_out)
        .field("pvac_i_out", pvac.i_out)
        .field("pvs_state", pvs.state.as_str())
        .field("pvs_disabled", pvs.disabled)
        .field("pvs_enable_output", pvs.enable_output)
        .field("pvs_v_ll", pvs.v_ll)
        .field("pvs_self_test_state", pvs.self_test_state.as_str());
    point = alert_block_fields(point, "pvac", &solar.pvac_alerts);
    point = alert_block_fields(point, "pvs", &solar.pvs_alerts);
    points.push(point);

    for string in &pvac.string_vitals {
        points.push(
            Point::new(measurement, ts)
                .tags(tags.iter().copied())
                .tag("string_id", string.string_id.to_string())
                .field("string_connected", string.connected)
                .field("string_measured_voltage", string.measured_voltage)
                .field("string_current", string.current)
                .field("string_measured_power", string.measured_power),
        );
    }
}

fn fault_points(snapshot: &Snapshot, measurement: &str, tags: &[(&str, &str)], points: &mut Vec<Point>) {
    let ts = ns(&snapshot.system_status.captured_at);

    for fault in &snapshot.system_status.data.grid_faults {
        for alert in &fault.alerts {
            points.push(
                Point::new(measurement, ts)
                    .tags(tags.iter().copied())
                    .tag("fault_name", fault.alert_name.as_str())
                    .tag("fault_subname", alert.name.as_str())
                    .tag("fault_units", alert.units.as_str())
                    .field("grid_fault_ts", fault.timestamp)
                    .field("grid_fault_isfault", fault.alert_is_fault)
                    .field("grid_fault_alert_raw", fault.alert_raw)
                    .field("grid_fault_ecu_type", fault.ecu_type.as_str())
                    .field("grid_fault_ecu_part_number", fault.ecu_package_part_number.as_str())
                    .field(
                        "grid_fault_ecu_serial_number",
                        fault.ecu_package_serial_number.as_str(),
                    )
                    .field("grid_fault_decoded_alert_value", alert.value.render()),
            );
        }
    }
}

fn device_point(measurement: &str, ts: i64, tags: &[(&str, &str)], kind: &str, device: &DeviceIdentity) -> Point {
    let point = Point::new(measurement, ts)
        .tags(tags.iter().copied())
        .tag("record", kind)
        .tag("device_din", device.din.as_str())
        .tag("device_part_number", device.part_number.as_str())
        .tag("device_serial_number", device.serial_number.as_str())
        .tag("device_component_parent_din", device.component_parent_din.as_str());
    match device.ecu_type {
        Some(code) => point.tag("device_ecu_type", code.to_string()),
        None => point,
    }
}

fn inverter_fields(mut point: Point, inverter: &InverterRecord) -> Point {
    point = point
        .field_opt("pvac_state", inverter.pvac_state.clone())
        .field_opt("pvac_grid_state", inverter.pvac_grid_state.clone())
        .field_opt("pvac_inv_state", inverter.pvac_inv_state.clone())
        .field_opt("pvac_v_out", inverter.pvac_v_out)
        .field_opt("pvac_f_out", inverter.pvac_f_out)
        .field_opt("pvac_p_out", inverter.pvac_p_out)
        .field_opt("pvac_q_out", inverter.pvac_q_out)
        .field_opt("pvac_v_l1_ground", inverter.pvac_v_l1_ground)
        .field_opt("pvac_v_l2_ground", inverter.pvac_v_l2_ground)
        .field_opt("pvac_v_hv_minus_chassis_dc", inverter.pvac_v_hv_minus_chassis_dc)
        .field_opt("pvac_lifetime_energy_pv_total", inverter.pvac_lifetime_energy_pv_total);

    for (channel, string) in InverterRecord::CHANNELS.iter().zip(&inverter.strings) {
        let c = channel.to_ascii_lowercase();
        point = point
            .field_opt(format!("string_{c}_current"), string.current)
            .field_opt(format!("string_{c}_measured_voltage"), string.measured_voltage)
            .field_opt(format!("string_{c}_measured_power"), string.measured_power)
            .field_opt(format!("string_{c}_state"), string.state.clone());
    }
    point
}

fn vitals_points(snapshot: &Snapshot, measurement: &str, tags: &[(&str, &str)], points: &mut Vec<Point>) {
    let vitals = &snapshot.vitals.data;
    let ts = ns(&snapshot.vitals.captured_at);

    for inverter in &vitals.inverters {
        let point = device_point(measurement, ts, tags, "inverter", &inverter.device);
        points.push(inverter_fields(point, inverter));
    }

    for temp in &vitals.temperatures {
        points.push(
            device_point(measurement, ts, tags, "temperature", &temp.device)
                .field_opt("thc_state", temp.state.clone())
                .field_opt("thc_ambient_temp", temp.ambient_temp),
        );
    }

    for alert in &vitals.alerts {
        points.push(
            device_point(measurement, ts, tags, "alert", &alert.device)
                .field("alert_count", alert.alerts.len() as i64)
                .field("alerts", alert.alerts.join(",")),
        );
    }
}
