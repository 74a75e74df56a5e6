// 构建脚本: 链接FFmpeg静态库依赖的系统库
fn main() {
    // 仅在Windows MSVC环境下添加摄像头采集相关库
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    {
        // DirectShow 设备枚举与采集
        println!("cargo:rustc-link-lib=dylib=strmiids");
        println!("cargo:rustc-link-lib=dylib=ole32");

        // OLE 自动化和VFW
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (TLS/SSL)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
