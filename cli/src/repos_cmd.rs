use repochat_api::BackendClient;
use repochat_client::ReqwestTransport;
use repochat_core::Config;
use repochat_core::MAX_REPOS;
use repochat_core::repos::check_index_request;

use crate::require_user;

pub(crate) async fn run_list(config: &Config, transport: ReqwestTransport) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let backend = BackendClient::new(transport, config.provider(), config.auth());
    let repos = backend.list_repos(&user_id).await?;
    for repo in &repos {
        println!("{}\t{}\t{}", repo.repo_name, repo.repo_url, repo.created_at);
    }
    eprintln!("{}/{MAX_REPOS} repositories indexed.", repos.len());
    Ok(())
}

pub(crate) async fn run_index(
    config: &Config,
    transport: ReqwestTransport,
    repo_url: &str,
) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let backend = BackendClient::new(transport, config.provider(), config.auth());
    let existing = backend.list_repos(&user_id).await?;
    let repo_name = check_index_request(&existing, repo_url)?;

    eprintln!("Indexing {repo_name}. Large repositories can take a few minutes...");
    let indexed = backend.index_repo(repo_url.trim(), &user_id).await?;
    println!(
        "{}: {} ({} chunks)",
        indexed.repo_name, indexed.message, indexed.total_chunks
    );
    Ok(())
}

pub(crate) async fn run_delete(
    config: &Config,
    transport: ReqwestTransport,
    repo_name: &str,
) -> anyhow::Result<()> {
    let user_id = require_user(config)?;
    let backend = BackendClient::new(transport, config.provider(), config.auth());
    let deleted = backend.delete_repo(&user_id, repo_name).await?;
    match deleted.message {
        Some(message) => println!("{message}"),
        None => println!("{repo_name}: {}", deleted.status),
    }
    Ok(())
}
