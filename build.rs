#[cfg(windows)]
fn main() {
    let mut res = winres::WindowsResource::new();
    res.set("ProductName", "HueLens");
    res.set("FileDescription", "HueLens - Window Hue Overlay");
    res.set("LegalCopyright", "© 2025 HueLens Contributors");
    res.set("CompanyName", "HueLens");
    res.set("OriginalFilename", "huelens.exe");

    if let Err(e) = res.compile() {
        eprintln!("Failed to compile Windows resource: {}", e);
    }
}

#[cfg(not(windows))]
fn main() {
}
