use super::load_or_exit;
use colored::Colorize;
use std::path::Path;

pub fn handle(path: Option<&Path>) {
    println!("{}", "Validating configuration...".blue());

    let config = load_or_exit(path);
    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  OS type: {}", config.os_type().to_string().cyan());
    println!("  VM size: {}", config.vm_size());
    match (&config.location, &config.build_resource_group_name) {
        (Some(location), _) => println!("  Location: {}", location),
        (None, Some(group)) => println!("  Build resource group: {} (existing)", group),
        (None, None) => {}
    }

    if config.is_managed_image() {
        println!(
            "  Output: managed image {} in {}",
            config.managed_image_name.as_deref().unwrap_or_default().cyan(),
            config
                .managed_image_resource_group_name
                .as_deref()
                .unwrap_or_default()
        );
        if let Some(snapshot) = &config.managed_image_os_disk_snapshot_name {
            println!("    - OS disk snapshot: {}", snapshot);
        }
        if let Some(gallery) = &config.shared_image_gallery_destination {
            println!(
                "    - gallery {}/{} version {}",
                gallery.gallery_name, gallery.image_name, gallery.image_version
            );
        }
    } else {
        println!(
            "  Output: VHD in {}/{}",
            config.storage_account.as_deref().unwrap_or_default().cyan(),
            config.capture_container_name.as_deref().unwrap_or_default()
        );
    }

    if let Some(network) = &config.virtual_network_name {
        println!("  Virtual network: {}", network);
    }
    if !config.communicator.provision.is_empty() {
        println!(
            "  Provisioning commands: {}",
            config.communicator.provision.len()
        );
    }
}
