//! Built-in node library

mod device;
mod logic;
mod wireless;

pub use device::{DeviceStateNode, LightNode, SmartPlugNode};
pub use wireless::{WirelessReceiveNode, WirelessSendNode};

use crate::registry::NodeRegistry;

/// Register every built-in node type plus the editor-only decorations
pub fn register_builtins(registry: &mut NodeRegistry) {
    registry.register("wireless_send", "Wireless Send", |services| {
        Box::new(WirelessSendNode::new(services))
    });
    registry.register("wireless_receive", "Wireless Receive", |services| {
        Box::new(WirelessReceiveNode::new(services))
    });
    registry.register("light", "Light Control", |services| {
        Box::new(LightNode::new(services))
    });
    registry.register("smart_plug", "Smart Plug", |services| {
        Box::new(SmartPlugNode::new(services))
    });
    registry.register("device_state", "Device State", |services| {
        Box::new(DeviceStateNode::new(services))
    });

    registry.register_definition(&logic::BOOLEAN);
    registry.register_definition(&logic::NUMBER);
    registry.register_definition(&logic::THRESHOLD);
    registry.register_definition(&logic::TIME_WINDOW);
    registry.register_definition(&logic::LOGIC_AND);
    registry.register_definition(&logic::LOGIC_OR);
    registry.register_definition(&logic::LOGIC_NOT);
    registry.register_definition(&logic::EDGE_DETECT);

    registry.mark_ui_only("Comment");
    registry.mark_ui_only("Note");
}
