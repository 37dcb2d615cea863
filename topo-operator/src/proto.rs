//! Generated protobuf types for the onos-topo API.

#![allow(clippy::enum_variant_names)]

/// Topology catalog service (onos-topo)
pub mod topo {
    tonic::include_proto!("onos.topo");
}
