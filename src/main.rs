//! Service Lifecycle 主程序入口
//!
//! 进程退出码等于服务生命周期内累计的错误数

#[tokio::main]
async fn main() {
    let code = match service_lifecycle::core::app::main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("错误: {e:#}");
            1
        }
    };

    std::process::exit(code);
}
