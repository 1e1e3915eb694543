//! Device report printed after bring-up

use serde::Serialize;
use strata_runtime::{CommandStreamReceiver, Device, RootDevice};

#[derive(Debug, Clone, Serialize)]
pub struct EngineReport {
    pub engine: String,
    pub receiver: String,
    pub context_id: u32,
    pub bitfield: u32,
    pub low_priority: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    pub root_device_index: u32,
    pub product: String,
    pub sub_devices: u32,
    pub bitfield: u32,
    pub engines: Vec<EngineReport>,
}

impl DeviceReport {
    pub fn from_device(device: &RootDevice) -> Self {
        let engines = device
            .engines()
            .iter()
            .map(|engine| EngineReport {
                engine: engine.os_context.engine_type.to_string(),
                receiver: engine.command_stream_receiver.receiver_type().to_string(),
                context_id: engine.os_context.context_id,
                bitfield: engine.os_context.device_bitfield.raw(),
                low_priority: engine.os_context.low_priority,
            })
            .collect();

        Self {
            root_device_index: device.root_device_index(),
            product: device.hardware_info().product_family().to_string(),
            sub_devices: device.num_sub_devices(),
            bitfield: device.device_bitfield().raw(),
            engines,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        let engines: Vec<String> = self
            .engines
            .iter()
            .map(|e| {
                if e.low_priority {
                    format!("{}(low)", e.engine)
                } else {
                    e.engine.clone()
                }
            })
            .collect();
        format!(
            "device {}: {} sub-devices={} bitfield={:#b} engines=[{}]",
            self.root_device_index,
            self.product,
            self.sub_devices,
            self.bitfield,
            engines.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{CommandStreamReceiverType, DebugSettings};
    use strata_discovery::DeviceFactory;

    fn simulated_devices(product: &str) -> Vec<RootDevice> {
        let factory = DeviceFactory::new(DebugSettings {
            set_command_stream_receiver: CommandStreamReceiverType::Aub.raw(),
            product_family_override: product.to_string(),
            ..DebugSettings::default()
        });
        factory.create_devices(factory.new_execution_environment())
    }

    #[test]
    fn test_single_tile_summary() {
        let devices = simulated_devices("skl");
        let report = DeviceReport::from_device(&devices[0]);

        assert_eq!(report.sub_devices, 0);
        assert_eq!(
            report.summary(),
            "device 0: skl sub-devices=0 bitfield=0b1 engines=[rcs, rcs(low)]"
        );
    }

    #[test]
    fn test_multi_tile_json() {
        let devices = simulated_devices("xehp");
        let report = DeviceReport::from_device(&devices[0]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["product"], "xehp");
        assert_eq!(json["sub_devices"], 2);
        assert_eq!(json["bitfield"], 3);
        assert_eq!(json["engines"].as_array().unwrap().len(), 1);
        assert_eq!(json["engines"][0]["receiver"], "aub");
    }
}
